//! Shared data model.
//!
//! Types here are plain value objects: no I/O, no locking. Components
//! that own state (`SessionStore`, `SpecialistPool`, the retrieval
//! indexes) wrap these in the concurrency primitives appropriate to
//! their own access pattern.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable corpus record shared by both retrieval indexes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub tickers: Vec<String>,
    pub publisher: String,
    pub link: String,
}

impl Document {
    /// Ticker set for filter intersection.
    pub fn ticker_set(&self) -> HashSet<&str> {
        self.tickers.iter().map(String::as_str).collect()
    }

    pub fn matches_filter(&self, tickers: &[String]) -> bool {
        if tickers.is_empty() {
            return true;
        }
        self.tickers.iter().any(|t| tickers.iter().any(|f| f == t))
    }
}

/// A single index hit. Scores are method-local and never compared
/// across methods without going through `HybridRetriever`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalHit {
    pub document_id: String,
    pub score: f64,
    pub rank: usize,
}

/// A closed set of periods market-data operations understand.
/// Unknown strings deserialize to `None` at the call site rather
/// than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "5d")]
    D5,
    #[serde(rename = "1mo")]
    Mo1,
    #[serde(rename = "3mo")]
    Mo3,
    #[serde(rename = "6mo")]
    Mo6,
    #[serde(rename = "1y")]
    Y1,
    #[serde(rename = "2y")]
    Y2,
    #[serde(rename = "5y")]
    Y5,
    #[serde(rename = "10y")]
    Y10,
    Ytd,
    Max,
}

impl Period {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "1d" => Some(Self::D1),
            "5d" => Some(Self::D5),
            "1mo" => Some(Self::Mo1),
            "3mo" => Some(Self::Mo3),
            "6mo" => Some(Self::Mo6),
            "1y" => Some(Self::Y1),
            "2y" => Some(Self::Y2),
            "5y" => Some(Self::Y5),
            "10y" => Some(Self::Y10),
            "ytd" => Some(Self::Ytd),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Approximate number of trading sessions a history call should
    /// return for this period; used by the in-memory quotes stub and
    /// by indicator windows that need "enough" history.
    pub fn approx_trading_days(self) -> usize {
        match self {
            Self::D1 => 1,
            Self::D5 => 5,
            Self::Mo1 => 21,
            Self::Mo3 => 63,
            Self::Mo6 => 126,
            Self::Y1 => 252,
            Self::Y2 => 504,
            Self::Y5 => 1260,
            Self::Y10 => 2520,
            Self::Ytd => 180,
            Self::Max => 2520,
        }
    }
}

/// A single OHLC bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Current quote. All fields optional: absence signals upstream
/// unavailability, never an exception.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub ticker: String,
    pub price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fundamentals {
    pub ticker: String,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalReading {
    pub ticker: String,
    pub sma: Option<f64>,
    pub ema: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdReading>,
    pub golden_cross: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacdReading {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Speaker of a turn in a session's conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    Tool,
}

/// Structured payload of a tool turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
}

/// A single append-only entry in a session's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Present only when `role == Tool`.
    pub tool: Option<ToolInvocation>,
}

impl Turn {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
            cost: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            tool: None,
        }
    }

    pub fn agent(
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        cost: f64,
        tokens_in: u64,
        tokens_out: u64,
    ) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            timestamp,
            cost,
            tokens_in,
            tokens_out,
            tool: None,
        }
    }

    pub fn tool(tool: ToolInvocation, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Tool,
            content: String::new(),
            timestamp,
            cost: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            tool: Some(tool),
        }
    }
}

/// Which specialist kind a query should route to, and what the last
/// generalist turn was "about" for follow-up resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialistKind {
    Market,
    News,
}

/// Rolling per-session aggregate used by `DecisionPolicy`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub query_count: u64,
    /// Classification tag of the last `N` queries, most recent last.
    pub recent_classifications: Vec<&'static str>,
    pub last_response_brief: bool,
    pub previous_user_dissatisfied: bool,
    /// Topic the last surfaced assistant turn was about, for
    /// dissatisfaction/follow-up target resolution (rule 3).
    pub last_topic: Option<SpecialistKind>,
    /// Most recently mentioned ticker symbol, carried forward so a
    /// pronoun-only follow-up ("why did it move?") still resolves to
    /// the same specialist-task fingerprint a prior pre-fetch used.
    pub last_ticker: Option<String>,
}

impl Profile {
    pub const RECENT_WINDOW: usize = 5;

    pub fn push_classification(&mut self, tag: &'static str) {
        self.recent_classifications.push(tag);
        let excess = self
            .recent_classifications
            .len()
            .saturating_sub(Self::RECENT_WINDOW);
        if excess > 0 {
            self.recent_classifications.drain(0..excess);
        }
    }

    /// Were the last two user turns classified as follow-ups (rule 6)?
    pub fn last_two_were_followups(&self) -> bool {
        let n = self.recent_classifications.len();
        n >= 2
            && self.recent_classifications[n - 1] == "followup"
            && self.recent_classifications[n - 2] == "followup"
    }
}

/// A session: its ordered turn log plus rolling profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,
    pub profile: Profile,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            profile: Profile::default(),
        }
    }

    pub fn append_turn(&mut self, turn: Turn) {
        debug_assert!(
            self.turns
                .last()
                .map(|t| turn.timestamp >= t.timestamp)
                .unwrap_or(true),
            "session turns must be monotonic in timestamp"
        );
        self.turns.push(turn);
    }

    /// Last `n` turns, oldest first, for specialist context windows.
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::User)
    }

    pub fn last_agent_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Agent)
    }

    /// Whether the most recent tool turn before the last agent turn
    /// invoked `search_news` (used to resolve follow-up topic).
    pub fn last_agent_turn_invoked_news(&self) -> bool {
        self.turns
            .iter()
            .rev()
            .take_while(|t| t.role != Role::User || t.role == Role::Tool)
            .any(|t| {
                t.tool
                    .as_ref()
                    .map(|inv| inv.tool_name == "search_news")
                    .unwrap_or(false)
            })
    }
}

/// Input to a specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub kind: SpecialistKind,
    pub focused_brief: String,
    pub context_window: Vec<Turn>,
    pub session_id: String,
}

/// Deterministic, order-insensitive normalization of a brief for
/// fingerprinting: lowercase, collapse whitespace. Two briefs that
/// differ only in casing or spacing coalesce onto the same Future.
pub fn normalize_brief(brief: &str) -> String {
    brief
        .split_whitespace()
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic specialist-submission fingerprint.
pub fn fingerprint(kind: SpecialistKind, brief: &str, session_id: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(match kind {
        SpecialistKind::Market => b"market",
        SpecialistKind::News => b"news",
    });
    hasher.update(b"\0");
    hasher.update(normalize_brief(brief).as_bytes());
    hasher.update(b"\0");
    hasher.update(session_id.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Output of a specialist task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistResult {
    pub kind: SpecialistKind,
    pub content: String,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
    pub task_fingerprint: String,
}
