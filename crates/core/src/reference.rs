use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::match_key::MatchKey;
use super::money::Money;

/// A warehouse order record: the internal side of the reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub reference_id: String,
    pub match_key: MatchKey,
    pub value: Money,
    /// When the warehouse order was created.
    pub window_start: Option<NaiveDateTime>,
    /// When the warehouse order was delivered.
    pub window_end: Option<NaiveDateTime>,
    pub completed: bool,
}

impl ReferenceRecord {
    pub fn has_window(&self) -> bool {
        self.window_start.is_some() && self.window_end.is_some()
    }
}
