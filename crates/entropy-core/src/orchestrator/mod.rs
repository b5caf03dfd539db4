//! Top-level request flow: consult the policy, run the generalist,
//! optionally await/synthesize a specialist, schedule a pre-fetch,
//! update the session.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentKind};
use crate::config::Config;
use crate::data::{fingerprint, Session, SpecialistKind, Task, Turn};
use crate::llm::{ChatMessage, LLMClient};
use crate::policy::{self, Decision};
use crate::pool::{GetOutcome, SpecialistPool, TaskExecutor};
use crate::session::SessionStore;
use crate::tools::{MarketDiagnostic, RetrievalDiagnostic, ToolBelt};

/// `{response, cost_usd, agent, session_id, prefetch_active}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub cost_usd: f64,
    pub agent: String,
    pub session_id: String,
    pub prefetch_active: bool,
}

/// `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDiagnostic {
    pub orchestrator_ready: bool,
    pub specialist_pool_active: bool,
}

/// `GET /diagnostic/{query}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticTrace {
    pub query: String,
    pub retrieval: RetrievalDiagnostic,
    pub market_data: MarketDiagnostic,
    pub generation: GenerationDiagnostic,
}

/// Executes one `Task` as a configured `MarketSpecialist`/`NewsSpecialist`
/// agent loop; installed into the `SpecialistPool` at construction.
struct SpecialistExecutor {
    llm: Arc<LLMClient>,
    toolbelt: Arc<ToolBelt>,
    config: Config,
}

#[async_trait::async_trait]
impl TaskExecutor for SpecialistExecutor {
    async fn execute(&self, task: &Task) -> (String, f64) {
        let kind = match task.kind {
            SpecialistKind::Market => AgentKind::MarketSpecialist,
            SpecialistKind::News => AgentKind::NewsSpecialist,
        };
        let model = kind.model(&self.config.llm).to_string();
        let agent = Agent::new(&self.llm, &self.toolbelt, kind, model);

        let system_prompt = match task.kind {
            SpecialistKind::Market => {
                "you are a market-data specialist; use tools to ground every figure you cite"
            }
            SpecialistKind::News => "you are a news specialist; ground every claim in a retrieved article",
        };

        let mut messages: Vec<ChatMessage> = task
            .context_window
            .iter()
            .filter_map(turn_to_message)
            .collect();
        messages.push(ChatMessage::user(task.focused_brief.clone()));

        let run = agent.run(system_prompt, messages).await;
        // `run.tool_turns` is dropped here: this executes inside the pool,
        // detached from any single session, and has no session to append to.
        (run.text, run.cost)
    }
}

fn turn_to_message(turn: &Turn) -> Option<ChatMessage> {
    match turn.role {
        crate::data::Role::User => Some(ChatMessage::user(turn.content.clone())),
        crate::data::Role::Agent => Some(ChatMessage::assistant(turn.content.clone())),
        crate::data::Role::Tool => None,
    }
}

/// Wall-clock budget for an immediate specialist before the
/// Orchestrator falls back to the anchor answer.
fn specialist_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.pool.timeout_seconds)
}

/// Brief a specialist `Task` is fingerprinted on. Anchored to the
/// ticker under discussion (when one is known) rather than the raw
/// query text, so a pronoun-only follow-up ("why did it move?")
/// still lands on the fingerprint a prior pre-fetch used.
fn canonical_brief(query: &str, ticker: Option<&str>) -> String {
    match ticker {
        Some(t) => format!("{t} analysis"),
        None => query.to_string(),
    }
}

/// Wires `SessionStore`, `SpecialistPool`, `LLMClient`, and `ToolBelt`
/// together as explicit dependencies.
pub struct Orchestrator {
    sessions: SessionStore,
    pool: Arc<SpecialistPool>,
    llm: Arc<LLMClient>,
    toolbelt: Arc<ToolBelt>,
    config: Config,
}

impl Orchestrator {
    pub fn new(config: Config, llm: Arc<LLMClient>, toolbelt: Arc<ToolBelt>) -> Self {
        let executor = Arc::new(SpecialistExecutor {
            llm: llm.clone(),
            toolbelt: toolbelt.clone(),
            config: config.clone(),
        });
        let pool = SpecialistPool::new(config.pool.clone(), executor);
        Self {
            sessions: SessionStore::new(),
            pool,
            llm,
            toolbelt,
            config,
        }
    }

    pub async fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub async fn diagnostic(&self, query: &str) -> DiagnosticTrace {
        tracing::info!("[DIAGNOSTIC] running trace for query={query:?}");
        let retrieval = self.toolbelt.diagnostic_retrieval(query).await;
        let market_data = self.toolbelt.diagnostic_market(query).await;
        DiagnosticTrace {
            query: query.to_string(),
            retrieval,
            market_data,
            generation: GenerationDiagnostic {
                orchestrator_ready: true,
                specialist_pool_active: self.pool.prefetch_allowed() || self.config.pool.max_workers >= 1,
            },
        }
    }

    /// `process_query(query, session_id)`.
    pub async fn process_query(&self, query: &str, session_id: &str) -> ChatResponse {
        let snapshot = self.sessions.snapshot(session_id);
        let decision = policy::classify(query, &snapshot);

        // A follow-up ("why did it move?") rarely repeats the ticker
        // a pre-fetch was keyed on; carry the last mentioned symbol
        // forward so both tasks resolve to the same fingerprint.
        let ticker = policy::extract_ticker(query).or_else(|| snapshot.profile.last_ticker.clone());
        let brief = canonical_brief(query, ticker.as_deref());

        // Captured before any agent runs so the append below stays
        // monotonic even though the turns it records (tool calls, then
        // the final answer) are all timestamped later, as they happen.
        let user_ts = chrono::Utc::now();

        let (response, cost, tag, tool_turns) = match decision {
            Decision::ImmediateSpecialist(kind) => {
                self.run_immediate_specialist(query, &brief, &snapshot, kind).await
            }
            _ => {
                let run = self.run_generalist(query, &snapshot, None).await;
                (run.text, run.cost, AgentTag::Generalist, run.tool_turns)
            }
        };

        let mut prefetch_active = false;
        if let Decision::GeneralistThenPrefetch(kind, _) = decision {
            if decision.schedules_prefetch() && self.pool.prefetch_allowed() {
                let task = Task {
                    kind,
                    focused_brief: brief.clone(),
                    context_window: snapshot.recent_turns(3).to_vec(),
                    session_id: session_id.to_string(),
                };
                self.pool.submit(task, true).await;
                prefetch_active = true;
            }
        }

        self.sessions.with_session(session_id, |s| {
            s.append_turn(Turn::user(query.to_string(), user_ts));
            for turn in tool_turns {
                s.append_turn(turn);
            }
            s.append_turn(Turn::agent(response.clone(), chrono::Utc::now(), cost, 0, 0));
        });
        self.sessions.record_query(session_id, decision, ticker);
        self.sessions
            .mark_response(session_id, response.len() < 200, false);

        ChatResponse {
            response,
            cost_usd: cost,
            agent: tag.as_str().to_string(),
            session_id: session_id.to_string(),
            prefetch_active,
        }
    }

    async fn run_generalist(&self, query: &str, snapshot: &Session, system_suffix: Option<&str>) -> crate::agent::AgentRun {
        let model = AgentKind::Generalist.model(&self.config.llm).to_string();
        let agent = Agent::new(&self.llm, &self.toolbelt, AgentKind::Generalist, model);

        let mut system = "you are a helpful financial-markets assistant".to_string();
        if let Some(suffix) = system_suffix {
            system.push_str(". ");
            system.push_str(suffix);
        }

        let mut messages: Vec<ChatMessage> = snapshot.turns.iter().filter_map(turn_to_message).collect();
        messages.push(ChatMessage::user(query.to_string()));

        agent.run(&system, messages).await
    }

    async fn run_immediate_specialist(
        &self,
        query: &str,
        brief: &str,
        snapshot: &Session,
        kind: SpecialistKind,
    ) -> (String, f64, AgentTag, Vec<Turn>) {
        let session_id = snapshot.id.clone();
        let f = fingerprint(kind, brief, &session_id);

        // Cache consumption on follow-ups: if a
        // pre-fetch already produced this fingerprint's result, skip
        // submission and synthesize directly.
        if let GetOutcome::Ready(cached) = self.pool.try_get(&f, Duration::ZERO).await {
            let anchor = self.run_generalist(query, snapshot, Some(ANCHOR_SUFFIX)).await;
            let synthesis = self.synthesize(query, &anchor.text, &cached.content).await;
            let mut tool_turns = anchor.tool_turns;
            tool_turns.extend(synthesis.tool_turns);
            return (
                synthesis.text,
                anchor.cost + synthesis.cost,
                tag_for(kind),
                tool_turns,
            );
        }

        let task = Task {
            kind,
            focused_brief: brief.to_string(),
            context_window: snapshot.recent_turns(3).to_vec(),
            session_id: session_id.clone(),
        };

        let (anchor, spec_outcome) = tokio::join!(
            self.run_generalist(query, snapshot, Some(ANCHOR_SUFFIX)),
            self.submit_and_await(task)
        );

        match spec_outcome {
            GetOutcome::Ready(result) => {
                let synthesis = self.synthesize(query, &anchor.text, &result.content).await;
                let mut tool_turns = anchor.tool_turns;
                tool_turns.extend(synthesis.tool_turns);
                (
                    synthesis.text,
                    anchor.cost + result.cost + synthesis.cost,
                    tag_for(kind),
                    tool_turns,
                )
            }
            GetOutcome::Pending | GetOutcome::Expired => (
                format!("{}\n\n(deeper analysis is still in progress)", anchor.text),
                anchor.cost,
                AgentTag::Generalist,
                anchor.tool_turns,
            ),
        }
    }

    async fn submit_and_await(&self, task: Task) -> GetOutcome {
        let f = self.pool.submit(task, false).await;
        self.pool.try_get(&f, specialist_timeout(&self.config)).await
    }

    async fn synthesize(&self, query: &str, anchor: &str, specialist_content: &str) -> crate::agent::AgentRun {
        let model = AgentKind::Generalist.model(&self.config.llm).to_string();
        let agent = Agent::new(&self.llm, &self.toolbelt, AgentKind::Generalist, model);
        let system = "fuse the anchor answer with the specialist's findings into one coherent response; \
                      on any factual conflict the specialist's figures win; do not call tools";
        let messages = vec![ChatMessage::user(format!(
            "original question: {query}\n\nanchor answer: {anchor}\n\nspecialist findings: {specialist_content}"
        ))];
        agent.run(system, messages).await
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

const ANCHOR_SUFFIX: &str =
    "a specialist is preparing deeper analysis; produce a short anchor answer in the meantime";

#[derive(Debug, Clone, Copy)]
enum AgentTag {
    Generalist,
    Market,
    News,
}

impl AgentTag {
    fn as_str(self) -> &'static str {
        match self {
            Self::Generalist => "generalist",
            Self::Market => "generalist+market_data",
            Self::News => "generalist+news",
        }
    }
}

fn tag_for(kind: SpecialistKind) -> AgentTag {
    match kind {
        SpecialistKind::Market => AgentTag::Market,
        SpecialistKind::News => AgentTag::News,
    }
}
