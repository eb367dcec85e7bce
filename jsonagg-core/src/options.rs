// jsonagg-core/src/options.rs
// Per-call aggregation options
//
// Only per-call state lives here. Verbosity is process-wide: see
// `logging::set_log_level`.

use crate::date_literal::ScriptDateParser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Options for `JsonCollection::aggregate_with_options`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateOptions {
    /// Instant used for `Date.now()` and `new Date()`; the system clock when unset
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

impl AggregateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Date literal parser honoring `now`
    pub fn date_parser(&self) -> ScriptDateParser {
        match self.now {
            Some(now) => ScriptDateParser::with_now(now),
            None => ScriptDateParser::new(),
        }
    }
}
