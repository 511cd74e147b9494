use serde::{Deserialize, Serialize};
use strum::Display;
use time::OffsetDateTime;

use super::{HoldingIdentity, SecureHash, StateRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UniquenessCheckType {
    /// Decide and durably record the outcome.
    Write,
    /// Query a previous outcome. Never creates or mutates a durable row.
    Read,
}

/// A request as it arrives from outside. Nothing in here has been validated yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniquenessCheckRequest {
    pub holding_identity: HoldingIdentity,
    pub originator_x500_name: String,
    pub transaction_id: String,
    pub input_states: Vec<String>,
    pub reference_states: Vec<String>,
    pub num_output_states: i32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub time_window_lower_bound: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub time_window_upper_bound: Option<OffsetDateTime>,
    pub check_type: UniquenessCheckType,
}

/// A request that passed normalisation. Identifiers are parsed, counts are within limits and a
/// WRITE request always carries an upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquenessCheckRequestInternal {
    pub holding_identity: HoldingIdentity,
    pub originator_x500_name: String,
    pub transaction_id: SecureHash,
    pub input_states: Vec<StateRef>,
    pub reference_states: Vec<StateRef>,
    pub num_output_states: u32,
    pub time_window_lower_bound: Option<OffsetDateTime>,
    pub time_window_upper_bound: Option<OffsetDateTime>,
    pub check_type: UniquenessCheckType,
}

impl UniquenessCheckRequestInternal {
    /// The state refs this transaction creates when it is accepted.
    pub fn output_states(&self) -> Vec<StateRef> {
        (0..self.num_output_states).map(|index| StateRef::new(self.transaction_id.clone(), index)).collect()
    }

    pub fn is_write(&self) -> bool {
        self.check_type == UniquenessCheckType::Write
    }
}
