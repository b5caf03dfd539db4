//! Process-wide session registry: create-on-first-use, append-only
//! turn log, rolling classification profile.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::data::{Profile, Session};
use crate::policy::classification_tag;
use crate::policy::Decision;

/// Shared store for every active `Session`, keyed by session id.
///
/// A single `Mutex<HashMap<..>>`: sessions are short-lived and low in
/// count relative to request volume, so a single lock is simpler than
/// sharding and has not shown up as a bottleneck in this shape of
/// workload.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` against the session for `session_id`, creating an
    /// empty one on first use.
    pub fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id));
        f(session)
    }

    pub fn profile(&self, session_id: &str) -> Profile {
        self.with_session(session_id, |s| s.profile.clone())
    }

    pub fn snapshot(&self, session_id: &str) -> Session {
        self.with_session(session_id, |s| s.clone())
    }

    /// Appends `turn` and folds `decision` into the rolling profile:
    /// bumps the query counter, records the classification tag for
    /// follow-up-streak detection, updates `last_topic` for an
    /// immediate-specialist route, and carries `ticker` forward (if
    /// one was mentioned) so a later pronoun-only follow-up still
    /// resolves to the same specialist-task brief.
    pub fn record_query(&self, session_id: &str, decision: Decision, ticker: Option<String>) {
        self.with_session(session_id, |s| {
            s.profile.query_count += 1;
            s.profile.push_classification(classification_tag(decision));
            if let Decision::ImmediateSpecialist(kind) = decision {
                s.profile.last_topic = Some(kind);
            }
            if let Some(t) = ticker {
                s.profile.last_ticker = Some(t);
            }
        });
    }

    pub fn mark_response(&self, session_id: &str, was_brief: bool, user_flagged_dissatisfaction: bool) {
        self.with_session(session_id, |s| {
            s.profile.last_response_brief = was_brief;
            s.profile.previous_user_dissatisfied = user_flagged_dissatisfaction;
        });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
