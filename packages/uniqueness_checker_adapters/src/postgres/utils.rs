use serde::de::DeserializeOwned;
use serde_json::Value;
use uniqueness_checker::{
    model::{SecureHash, StateRef},
    ports::errors::{BackingStoreError, BackingStoreErrorKind, StorageErrorCategory},
};

pub const RESULT_TYPE_ACCEPTED: &str = "A";
pub const RESULT_TYPE_REJECTED: &str = "R";

fn parse_error(reason: impl Into<String>, data: impl Into<String>) -> BackingStoreError {
    // a row that cannot be read back will not get better by retrying
    BackingStoreError::new(BackingStoreErrorKind::ParseError, StorageErrorCategory::Uncategorized, reason).with_data(data)
}

pub fn parse_hash_column(value: &str) -> Result<SecureHash, BackingStoreError> {
    value.parse::<SecureHash>().map_err(|e| parse_error(e.to_string(), value))
}

pub fn parse_index_column(tx_id: &str, value: i32) -> Result<u32, BackingStoreError> {
    u32::try_from(value).map_err(|e| parse_error(e.to_string(), format!("{tx_id}:{value}")))
}

pub fn parse_json_column<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, BackingStoreError> {
    serde_json::from_value::<T>(value).map_err(|e| parse_error(e.to_string(), key))
}

fn state_ref_index(state_ref: &StateRef) -> Result<i32, BackingStoreError> {
    // no row can hold such an index, so retrying is pointless
    i32::try_from(state_ref.index).map_err(|e| {
        BackingStoreError::new(BackingStoreErrorKind::ParseError, StorageErrorCategory::Uncategorized, e.to_string()).with_data(state_ref.to_string())
    })
}

/// Split state refs into the parallel `text[]` / `int4[]` arrays fed to `UNNEST`.
pub fn state_ref_columns(state_refs: &[StateRef]) -> Result<(Vec<String>, Vec<i32>), BackingStoreError> {
    let mut tx_ids = Vec::with_capacity(state_refs.len());
    let mut indices = Vec::with_capacity(state_refs.len());

    for state_ref in state_refs {
        indices.push(state_ref_index(state_ref)?);
        tx_ids.push(state_ref.tx_hash.to_string());
    }

    Ok((tx_ids, indices))
}

/// Same as [`state_ref_columns`] for lookups. A ref whose index does not fit `int4` cannot be stored,
/// so it is left out and ends up reported as unknown.
pub fn lookup_state_ref_columns(state_refs: &[StateRef]) -> (Vec<String>, Vec<i32>) {
    state_refs
        .iter()
        .filter_map(|state_ref| state_ref_index(state_ref).ok().map(|index| (state_ref.tx_hash.to_string(), index)))
        .unzip()
}
