//! Session routing
//!
//! Maps a session id to its `Session`. Turns within one session are strictly
//! sequential (per-session lock held across the turn); distinct sessions run
//! in parallel and share only the read-only snapshot and rule table.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::engine::{Reply, Session, SessionDeps};

pub struct SessionRouter {
    deps: Arc<SessionDeps>,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionRouter {
    pub fn new(deps: Arc<SessionDeps>) -> Self {
        Self {
            deps,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    async fn session(&self, session_id: &str) -> (Arc<Mutex<Session>>, bool) {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(session_id) {
            Some(session) => (Arc::clone(session), false),
            None => {
                debug!(%session_id, "session: creating");
                let session = Arc::new(Mutex::new(Session::new(
                    session_id,
                    Arc::clone(&self.deps),
                )));
                sessions.insert(session_id.to_string(), Arc::clone(&session));
                (session, true)
            }
        }
    }

    /// Route one message. A first contact greets before handling the input.
    pub async fn dispatch(&self, session_id: &str, input: &str) -> Vec<Reply> {
        let (session, created) = self.session(session_id).await;
        let mut session = session.lock().await;
        let mut replies = Vec::new();
        if created {
            replies.extend(session.start().await);
        }
        replies.extend(session.handle_turn(input).await);
        replies
    }

    /// Greet a session without consuming a message
    pub async fn open(&self, session_id: &str) -> Vec<Reply> {
        let (session, created) = self.session(session_id).await;
        if !created {
            return Vec::new();
        }
        let mut session = session.lock().await;
        session.start().await
    }
}
