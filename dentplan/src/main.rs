//! DentPlan - conversational treatment plan assistant
//!
//! CLI entry point: interactive chat plus one-shot pricing and search.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, info};

use dentplan::cli::{Cli, Command};
use dentplan::config::Config;
use dentplan::context::InMemoryContextStore;
use dentplan::draft::NarrativeDrafter;
use dentplan::session::{SessionDeps, SessionRouter};
use dentplan::{
    AliasTable, CatalogResolver, CatalogService, CatalogSnapshot, GuidelineBook,
    HttpPricingBackend, HttpSemanticSearch, PricingBackend, SnapshotPricingBackend,
};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dentplan")
        .join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let log_file =
        fs::File::create(log_dir.join("dentplan.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn build_deps(config: &Config) -> Result<Arc<SessionDeps>> {
    let snapshot = CatalogSnapshot::load_jsonl(&config.catalog.path)
        .with_context(|| format!("Failed to load price list from {}", config.catalog.path.display()))?;
    info!(entry_count = snapshot.len(), "build_deps: price list loaded");
    let catalog = Arc::new(CatalogService::new(snapshot));

    let aliases = AliasTable::load(&config.catalog.aliases_path);
    let guidelines = GuidelineBook::load(&config.catalog.guidelines_path);

    let search = HttpSemanticSearch::from_config(&config.semantic)
        .context("Failed to build semantic search client")?;
    let resolver = CatalogResolver::new(
        Arc::clone(&catalog),
        aliases,
        guidelines,
        Arc::new(search),
        Duration::from_millis(config.semantic.timeout_ms),
        config.semantic.top_k,
    );

    // Empty pricing base-url means in-process pricing against the snapshot
    let pricing: Arc<dyn PricingBackend> = if config.pricing.base_url.trim().is_empty() {
        Arc::new(SnapshotPricingBackend::new(Arc::clone(&catalog)))
    } else {
        Arc::new(
            HttpPricingBackend::from_config(&config.pricing)
                .map_err(|e| eyre::eyre!("Failed to build pricing client: {e}"))?,
        )
    };

    let backend = dentplan::llm::from_config(&config.llm)
        .map(|client| Arc::new(client) as Arc<dyn dentplan::GenerationClient>);
    let drafter = NarrativeDrafter::new(backend).map_err(|e| eyre::eyre!("{e}"))?;

    let deps = Arc::new(SessionDeps {
        resolver: Arc::new(resolver),
        pricing,
        store: Arc::new(InMemoryContextStore::new()),
        drafter,
    });
    Ok(deps)
}

async fn cmd_chat(config: &Config, session_id: &str) -> Result<()> {
    let deps = build_deps(config)?;
    let router = SessionRouter::new(deps);

    println!();
    println!("{}", "DentPlan console".bright_cyan().bold());
    println!("Пиши сообщения как оператор; Ctrl+D — выход.");
    println!();

    for reply in router.open(session_id).await {
        println!("{reply}");
    }

    let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;
    loop {
        match rl.readline(&format!("{} ", ">".bright_green())) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);
                for reply in router.dispatch(session_id, input).await {
                    println!("{reply}");
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => {
                return Err(eyre::eyre!("Readline error: {}", err));
            }
        }
    }

    println!("До встречи!");
    Ok(())
}

async fn cmd_price(config: &Config, codes: &[String]) -> Result<()> {
    let deps = build_deps(config)?;
    match deps.pricing.price_codes(codes).await {
        Ok(plan) => {
            for line in &plan.lines {
                println!(
                    "• {}: {} × {} → {:.0} ₽",
                    line.code, line.display_name, line.quantity, line.line_total
                );
            }
            println!("\nИтого: {:.0} ₽", plan.total);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {e}", "Ошибка:".bright_red());
            std::process::exit(1);
        }
    }
}

async fn cmd_search(config: &Config, query: &str) -> Result<()> {
    let deps = build_deps(config)?;
    let set = deps
        .resolver
        .search_semantic(query)
        .await
        .map_err(|e| eyre::eyre!("{e}"))?;
    if set.is_empty() {
        println!("Совпадений не найдено.");
        return Ok(());
    }
    for (idx, candidate) in set.candidates.iter().enumerate() {
        let score = candidate
            .score
            .map(|s| format!(" [{s:.3}]"))
            .unwrap_or_default();
        println!(
            "{}. {} — {} ({} ₽){score}",
            idx + 1,
            candidate.entry.code,
            candidate.entry.display_name,
            candidate.entry.base_price
        );
        if let Some(guideline) = deps.resolver.guideline_for(&candidate.entry.code) {
            println!("   ℹ️ {} ({})", guideline.summary, guideline.reference);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    debug!("main: dispatching command");
    match cli.command {
        Some(Command::Price { codes }) => cmd_price(&config, &codes).await,
        Some(Command::Search { query }) => cmd_search(&config, &query.join(" ")).await,
        Some(Command::Chat { session }) => cmd_chat(&config, &session).await,
        None => cmd_chat(&config, "console").await,
    }
}
