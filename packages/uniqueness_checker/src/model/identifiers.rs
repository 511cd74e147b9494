use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CommonError;

/// A digest together with the name of the algorithm that produced it.
///
/// Textual form is `ALGORITHM:HEXDIGEST`, e.g. `SHA-256:9F86D081...`. The hex digest is always
/// rendered upper-case so two equal hashes always have the same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecureHash {
    algorithm: String,
    bytes: Vec<u8>,
}

impl SecureHash {
    pub fn new(algorithm: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            bytes,
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, hex::encode_upper(&self.bytes))
    }
}

impl FromStr for SecureHash {
    type Err = CommonError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parse_error = |reason: &str| CommonError::ParseError {
            data: value.to_owned(),
            reason: reason.to_owned(),
        };

        let (algorithm, digest) = value.split_once(':').ok_or_else(|| parse_error("missing ':' between algorithm and digest"))?;

        if algorithm.is_empty() || !algorithm.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(parse_error("invalid algorithm name"));
        }
        if digest.is_empty() {
            return Err(parse_error("empty digest"));
        }

        let bytes = hex::decode(digest).map_err(|e| parse_error(&e.to_string()))?;

        Ok(SecureHash::new(algorithm, bytes))
    }
}

impl TryFrom<String> for SecureHash {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecureHash> for String {
    fn from(hash: SecureHash) -> Self {
        hash.to_string()
    }
}

/// Largest output index a state ref may carry. Stores keep indices as signed 32-bit integers.
pub const MAX_STATE_INDEX: u32 = i32::MAX as u32;

/// Points at one output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateRef {
    pub tx_hash: SecureHash,
    pub index: u32,
}

impl StateRef {
    pub fn new(tx_hash: SecureHash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

impl FromStr for StateRef {
    type Err = CommonError;

    /// The hash itself contains a `:`, so the index is whatever follows the last one.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (hash, index) = value.rsplit_once(':').ok_or_else(|| CommonError::ParseError {
            data: value.to_owned(),
            reason: "missing ':' before output index".to_owned(),
        })?;

        let index = index.parse::<u32>().map_err(|e| CommonError::ParseError {
            data: value.to_owned(),
            reason: format!("invalid output index - {e}"),
        })?;

        Ok(StateRef::new(hash.parse()?, index))
    }
}

impl TryFrom<String> for StateRef {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StateRef> for String {
    fn from(state_ref: StateRef) -> Self {
        state_ref.to_string()
    }
}

/// The party on whose behalf requests are checked. Every backing store session is scoped to
/// exactly one holding identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingIdentity {
    pub x500_name: String,
    pub group_id: String,
}

impl HoldingIdentity {
    pub fn new(x500_name: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            x500_name: x500_name.into(),
            group_id: group_id.into(),
        }
    }
}

impl fmt::Display for HoldingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.x500_name, self.group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_hash_parses_and_renders_upper_case() {
        let hash: SecureHash = "SHA-256:0a0bff".parse().unwrap();

        assert_eq!(hash.algorithm(), "SHA-256");
        assert_eq!(hash.bytes(), &[0x0a, 0x0b, 0xff]);
        assert_eq!(hash.to_string(), "SHA-256:0A0BFF");
    }

    #[test]
    fn secure_hash_rejects_malformed_text() {
        for bad in ["SHA-256", ":0A0B", "SHA-256:", "SHA-256:0A0", "SHA-256:XYZ1", "SHA 256:0A0B"] {
            let result = bad.parse::<SecureHash>();
            assert!(matches!(result, Err(CommonError::ParseError { .. })), "expected {bad} to be rejected");
        }
    }

    #[test]
    fn state_ref_splits_on_last_colon() {
        let state_ref: StateRef = "SHA-256:ABCD:12".parse().unwrap();

        assert_eq!(state_ref.tx_hash.to_string(), "SHA-256:ABCD");
        assert_eq!(state_ref.index, 12);
        assert_eq!(state_ref.to_string(), "SHA-256:ABCD:12");
    }

    #[test]
    fn state_ref_rejects_bad_index() {
        assert!("SHA-256:ABCD:-1".parse::<StateRef>().is_err());
        assert!("SHA-256:ABCD:x".parse::<StateRef>().is_err());
        assert!("SHA-256:ABCD".parse::<StateRef>().is_err());
    }

    #[test]
    fn state_ref_serialises_as_string() {
        let state_ref: StateRef = "SHA-256:ABCD:3".parse().unwrap();
        let json = serde_json::to_string(&state_ref).unwrap();

        assert_eq!(json, "\"SHA-256:ABCD:3\"");
        assert_eq!(serde_json::from_str::<StateRef>(&json).unwrap(), state_ref);
    }

    #[test]
    fn holding_identity_display() {
        let identity = HoldingIdentity::new("O=Alice, L=London, C=GB", "group-1");
        assert_eq!(identity.to_string(), "O=Alice, L=London, C=GB@group-1");
    }
}
