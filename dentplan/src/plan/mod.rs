//! Treatment plan aggregation
//!
//! A plan is an ordered set of quantity-bearing lines, at most one per
//! service code. [`combine`] is the single merge point: it is pure, idempotent
//! under empty input, and associative across incremental batches, so the
//! session can re-run it every turn without drifting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::catalog::CatalogEntry;

mod candidates;

pub use candidates::CandidateSet;

/// One aggregated, quantity-bearing plan row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLine {
    pub code: String,
    pub display_name: String,
    pub section: String,
    pub base_price: f64,
    /// Number of units, always >= 1
    pub quantity: u32,
    /// base_price * quantity, recomputed on every merge
    pub line_total: f64,
}

impl PlanLine {
    /// Build a line from a catalog entry and a unit count
    pub fn from_entry(entry: &CatalogEntry, quantity: u32) -> Self {
        debug!(code = %entry.code, %quantity, "PlanLine::from_entry: called");
        Self {
            code: entry.code.clone(),
            display_name: entry.display_name.clone(),
            section: entry.section.clone(),
            base_price: entry.base_price,
            quantity,
            line_total: entry.base_price * quantity as f64,
        }
    }
}

/// An assembled treatment plan
///
/// `total` is always recomputed from the lines, never mutated independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub lines: Vec<PlanLine>,
    pub total: f64,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Codes in current display order
    pub fn codes(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.code.clone()).collect()
    }
}

/// Merge new lines into an existing plan
///
/// Quantities merge per code, line totals and the plan total are recomputed,
/// and the output is ordered by each code's position in `first_seen` (codes
/// missing from it sort last, in insertion order). Calling with an empty
/// batch returns a plan equal to the input.
pub fn combine(existing: &Plan, new_lines: &[PlanLine], first_seen: &[String]) -> Plan {
    debug!(
        existing_lines = existing.lines.len(),
        new_lines = new_lines.len(),
        order_len = first_seen.len(),
        "combine: called"
    );

    // Merge by code, preserving insertion order for the final stable sort
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, PlanLine> = HashMap::new();

    for line in existing.lines.iter().chain(new_lines.iter()) {
        match merged.get_mut(&line.code) {
            Some(entry) => {
                entry.quantity += line.quantity;
            }
            None => {
                order.push(line.code.clone());
                merged.insert(line.code.clone(), line.clone());
            }
        }
    }

    let first_seen_index: HashMap<&str, usize> = first_seen
        .iter()
        .enumerate()
        .map(|(idx, code)| (code.as_str(), idx))
        .rev() // first occurrence wins
        .collect();

    let mut lines: Vec<PlanLine> = order
        .into_iter()
        .filter_map(|code| merged.remove(&code))
        .map(|mut line| {
            line.line_total = line.base_price * line.quantity as f64;
            line
        })
        .collect();

    lines.sort_by_key(|line| {
        first_seen_index
            .get(line.code.as_str())
            .copied()
            .unwrap_or(first_seen_index.len())
    });

    let total = lines.iter().map(|l| l.line_total).sum();
    Plan { lines, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_snapshot;
    use proptest::prelude::*;

    fn line(code: &str, price: f64, quantity: u32) -> PlanLine {
        PlanLine {
            code: code.to_string(),
            display_name: format!("Услуга {code}"),
            section: "Терапия".to_string(),
            base_price: price,
            quantity,
            line_total: price * quantity as f64,
        }
    }

    #[test]
    fn test_combine_empty_batch_is_identity() {
        let order = vec!["202208".to_string(), "800202".to_string()];
        let plan = combine(&Plan::default(), &[line("202208", 4500.0, 1), line("800202", 21000.0, 2)], &order);

        let again = combine(&plan, &[], &order);
        assert_eq!(again, plan);
    }

    #[test]
    fn test_combine_merges_quantities_and_recomputes_totals() {
        let snapshot = test_snapshot();
        let order = vec!["202208".to_string(), "800202".to_string()];

        let first = combine(
            &Plan::default(),
            &[PlanLine::from_entry(snapshot.get("202208").unwrap(), 1)],
            &order,
        );
        let second = combine(
            &first,
            &[
                PlanLine::from_entry(snapshot.get("800202").unwrap(), 1),
                PlanLine::from_entry(snapshot.get("800202").unwrap(), 1),
            ],
            &order,
        );

        assert_eq!(second.lines.len(), 2);
        assert_eq!(second.lines[0].code, "202208");
        assert_eq!(second.lines[1].code, "800202");
        assert_eq!(second.lines[1].quantity, 2);
        assert_eq!(second.lines[1].line_total, 42000.0);
        assert_eq!(second.total, 4500.0 + 42000.0);
    }

    #[test]
    fn test_combine_orders_by_first_seen() {
        // Codes were introduced in conversation order 800202 then 202208,
        // even though the new batch arrives the other way round
        let order = vec!["800202".to_string(), "202208".to_string()];
        let plan = combine(&Plan::default(), &[line("202208", 4500.0, 1), line("800202", 21000.0, 1)], &order);

        assert_eq!(plan.codes(), vec!["800202", "202208"]);
    }

    #[test]
    fn test_combine_unknown_codes_sort_last_stable() {
        let order = vec!["800202".to_string()];
        let plan = combine(
            &Plan::default(),
            &[line("111", 1.0, 1), line("800202", 21000.0, 1), line("222", 2.0, 1)],
            &order,
        );

        assert_eq!(plan.codes(), vec!["800202", "111", "222"]);
    }

    #[test]
    fn test_combine_two_batches_equals_one() {
        let order = vec!["202208".to_string(), "800202".to_string(), "809102".to_string()];
        let b1 = vec![line("202208", 4500.0, 1), line("809102", 55000.0, 1)];
        let b2 = vec![line("800202", 21000.0, 1), line("202208", 4500.0, 1)];

        let incremental = combine(&combine(&Plan::default(), &b1, &order), &b2, &order);
        let union: Vec<PlanLine> = b1.iter().chain(b2.iter()).cloned().collect();
        let single = combine(&Plan::default(), &union, &order);

        assert_eq!(incremental, single);
    }

    proptest! {
        #[test]
        fn prop_combine_associative(
            codes1 in proptest::collection::vec(0usize..6, 0..8),
            codes2 in proptest::collection::vec(0usize..6, 0..8),
        ) {
            let universe = ["100", "200", "300", "400", "500", "600"];
            let order: Vec<String> = universe.iter().map(|c| c.to_string()).collect();
            let to_lines = |idxs: &[usize]| -> Vec<PlanLine> {
                idxs.iter().map(|i| line(universe[*i], (*i as f64 + 1.0) * 100.0, 1)).collect()
            };

            let b1 = to_lines(&codes1);
            let b2 = to_lines(&codes2);
            let union: Vec<PlanLine> = b1.iter().chain(b2.iter()).cloned().collect();

            let incremental = combine(&combine(&Plan::default(), &b1, &order), &b2, &order);
            let single = combine(&Plan::default(), &union, &order);

            prop_assert_eq!(incremental, single);
        }

        #[test]
        fn prop_total_matches_lines(
            quantities in proptest::collection::vec(1u32..5, 1..6),
        ) {
            let lines: Vec<PlanLine> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| line(&format!("{}", 100 + i), (i as f64 + 1.0) * 50.0, *q))
                .collect();
            let plan = combine(&Plan::default(), &lines, &[]);

            let expected: f64 = plan.lines.iter().map(|l| l.base_price * l.quantity as f64).sum();
            prop_assert_eq!(plan.total, expected);
        }

        #[test]
        fn prop_empty_batch_identity(
            codes in proptest::collection::vec(0usize..6, 0..10),
        ) {
            let universe = ["100", "200", "300", "400", "500", "600"];
            let order: Vec<String> = universe.iter().map(|c| c.to_string()).collect();
            let lines: Vec<PlanLine> = codes.iter().map(|i| line(universe[*i], 10.0, 1)).collect();

            let plan = combine(&Plan::default(), &lines, &order);
            prop_assert_eq!(combine(&plan, &[], &order), plan);
        }
    }
}
