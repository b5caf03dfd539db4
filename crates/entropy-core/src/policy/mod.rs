//! Pure query classifier.
//!
//! A closed set of regex rules, checked in order, picks a routing
//! decision without an LLM call.

use lazy_static::lazy_static;
use regex::Regex;

use crate::data::{Session, SpecialistKind};

/// Decision returned by `classify`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    GeneralistOnly,
    ImmediateSpecialist(SpecialistKind),
    /// Second field is pre-fetch confidence in `[0, 1]`.
    GeneralistThenPrefetch(SpecialistKind, f64),
}

impl Decision {
    /// Only decisions with pre-fetch confidence >= 0.80 schedule
    /// background work.
    pub fn schedules_prefetch(&self) -> bool {
        matches!(self, Decision::GeneralistThenPrefetch(_, confidence) if *confidence >= 0.80)
    }
}

lazy_static! {
    static ref TECHNICAL_JARGON: Regex = Regex::new(
        r"(?i)\b(rsi|macd|moving average|golden cross|ema|sma|bollinger|support|resistance|technical indicator)\b"
    ).unwrap();

    static ref DEPTH_REQUEST: Regex = Regex::new(
        r"(?i)\b(detailed analysis|comprehensive report|in depth|dive deeper)\b"
    ).unwrap();

    static ref DISSATISFACTION: Regex = Regex::new(
        r"(?i)\b(not enough detail|tell me more|why\??|elaborate|more detail)\b"
    ).unwrap();

    static ref ANALYTICAL: Regex = Regex::new(
        r"(?i)\b(compare|versus|vs\.?|top|best|worst|performance)\b"
    ).unwrap();

    static ref PREFETCH_MOVED: Regex = Regex::new(
        r"(?i)(what moved|why did .* move|what happened to)"
    ).unwrap();

    static ref NEWS_MENTION: Regex = Regex::new(
        r"(?i)\b(news|article|headline|report(ed|s)?)\b"
    ).unwrap();

    /// Crude all-caps ticker extraction, shared with the Orchestrator
    /// for pre-fetch brief construction.
    static ref TICKER: Regex = Regex::new(r"\b[A-Z]{1,5}\b").unwrap();
}

/// Best-effort ticker symbol extraction from free text (used by rule 5
/// and by the Orchestrator when building a follow-up `Task`).
pub fn extract_ticker(query: &str) -> Option<String> {
    TICKER
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .find(|t| !matches!(t.as_str(), "I" | "A" | "RSI" | "MACD" | "EMA" | "SMA"))
}

/// Pure `classify(query, session) -> Decision`. Rules are
/// evaluated in order; first match wins.
pub fn classify(query: &str, session: &Session) -> Decision {
    // Rule 1: technical jargon.
    if TECHNICAL_JARGON.is_match(query) {
        return Decision::ImmediateSpecialist(SpecialistKind::Market);
    }

    // Rule 2: explicit depth request.
    if DEPTH_REQUEST.is_match(query) {
        let kind = if session.last_agent_turn_invoked_news() {
            SpecialistKind::News
        } else {
            SpecialistKind::Market
        };
        return Decision::ImmediateSpecialist(kind);
    }

    // Rule 3: dissatisfaction follow-up (requires a prior user turn).
    if session.last_user_turn().is_some() && DISSATISFACTION.is_match(query) {
        let kind = match session.profile.last_topic {
            Some(kind) => kind,
            // Open Question: no prior ticker discussed ->
            // default to news.
            None => SpecialistKind::News,
        };
        return Decision::ImmediateSpecialist(kind);
    }

    // Rule 4: power-user analytical.
    if session.profile.query_count >= 10 && ANALYTICAL.is_match(query) {
        return Decision::ImmediateSpecialist(SpecialistKind::Market);
    }

    // Rule 5: pre-fetch "what moved X".
    if PREFETCH_MOVED.is_match(query) && extract_ticker(query).is_some() {
        return Decision::GeneralistThenPrefetch(SpecialistKind::News, 0.85);
    }

    // Rule 6: pre-fetch follow-up pattern (last two user turns were
    // follow-ups).
    if session.profile.last_two_were_followups() {
        return Decision::GeneralistThenPrefetch(SpecialistKind::Market, 0.80);
    }

    // Rule 7: pre-fetch power-user news with brief likely response.
    if session.profile.query_count >= 10 && NEWS_MENTION.is_match(query) {
        return Decision::GeneralistThenPrefetch(SpecialistKind::News, 0.80);
    }

    // Rule 8: otherwise.
    Decision::GeneralistOnly
}

/// Classification tag recorded into `Profile::recent_classifications`
/// for rule 6's lookback.
pub fn classification_tag(decision: Decision) -> &'static str {
    match decision {
        Decision::GeneralistOnly => "generalist",
        Decision::ImmediateSpecialist(_) => "followup",
        Decision::GeneralistThenPrefetch(_, _) => "prefetch",
    }
}
