use ahash::AHashSet;
use time::OffsetDateTime;

use crate::{
    config::UniquenessCheckerConfig,
    model::{
        SecureHash, StateRef, MAX_STATE_INDEX, UniquenessCheckError, UniquenessCheckRequest, UniquenessCheckRequestInternal, UniquenessCheckResponse, UniquenessCheckResult,
        UniquenessCheckType,
    },
};

/// A request rejected before it ever reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRequest {
    /// `None` when the transaction id itself could not be parsed.
    pub transaction_id: Option<SecureHash>,
    pub error_text: String,
}

impl MalformedRequest {
    fn new(transaction_id: Option<&SecureHash>, error_text: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.cloned(),
            error_text: error_text.into(),
        }
    }

    /// Malformed requests are answered straight away and never stored.
    pub fn into_response(self, now: OffsetDateTime) -> UniquenessCheckResponse {
        UniquenessCheckResponse {
            transaction_id: self.transaction_id,
            result: UniquenessCheckResult::failure(now, UniquenessCheckError::MalformedRequest { error_text: self.error_text }),
        }
    }
}

pub struct RequestNormalizer {
    max_states_per_request: usize,
    max_output_states: u32,
}

impl RequestNormalizer {
    pub fn new(config: &UniquenessCheckerConfig) -> Self {
        Self {
            max_states_per_request: config.max_states_per_request,
            // output indices of an accepted request must stay addressable
            max_output_states: config.max_output_states.min(MAX_STATE_INDEX),
        }
    }

    pub fn normalize(&self, request: &UniquenessCheckRequest) -> Result<UniquenessCheckRequestInternal, MalformedRequest> {
        let transaction_id: SecureHash = request
            .transaction_id
            .parse()
            .map_err(|e| MalformedRequest::new(None, format!("Invalid transaction id {}: {e}", request.transaction_id)))?;
        let tx_id = Some(&transaction_id);

        if request.holding_identity.x500_name.trim().is_empty() {
            return Err(MalformedRequest::new(tx_id, "Holding identity x500 name cannot be empty."));
        }

        if request.originator_x500_name.trim().is_empty() {
            return Err(MalformedRequest::new(tx_id, "Originator x500 name cannot be empty."));
        }

        if request.num_output_states < 0 {
            return Err(MalformedRequest::new(tx_id, "Number of output states cannot be less than 0."));
        }
        let num_output_states = request.num_output_states as u32;
        if num_output_states > self.max_output_states {
            return Err(MalformedRequest::new(
                tx_id,
                format!(
                    "Number of output states ({num_output_states}) exceeded the maximum limit ({}).",
                    self.max_output_states
                ),
            ));
        }

        let num_states = request.input_states.len() + request.reference_states.len();
        if num_states > self.max_states_per_request {
            return Err(MalformedRequest::new(
                tx_id,
                format!(
                    "Number of input + reference states sent ({num_states}) exceeded the maximum limit ({}).",
                    self.max_states_per_request
                ),
            ));
        }

        let input_states = parse_state_refs(&request.input_states, "input").map_err(|text| MalformedRequest::new(tx_id, text))?;
        let reference_states = parse_state_refs(&request.reference_states, "reference").map_err(|text| MalformedRequest::new(tx_id, text))?;

        if request.check_type == UniquenessCheckType::Write && request.time_window_upper_bound.is_none() {
            return Err(MalformedRequest::new(tx_id, "Time window upper bound is required for WRITE checks."));
        }

        Ok(UniquenessCheckRequestInternal {
            holding_identity: request.holding_identity.clone(),
            originator_x500_name: request.originator_x500_name.clone(),
            transaction_id,
            input_states,
            reference_states,
            num_output_states,
            time_window_lower_bound: request.time_window_lower_bound,
            time_window_upper_bound: request.time_window_upper_bound,
            check_type: request.check_type,
        })
    }
}

/// Parse a list of state refs, rejecting refs that appear more than once.
fn parse_state_refs(raw: &[String], label: &str) -> Result<Vec<StateRef>, String> {
    let mut seen = AHashSet::with_capacity(raw.len());
    raw.iter()
        .map(|value| {
            let state_ref: StateRef = value.parse().map_err(|e| format!("Invalid {label} state ref {value}: {e}"))?;
            if state_ref.index > MAX_STATE_INDEX {
                return Err(format!("Invalid {label} state ref {value}: output index exceeds {MAX_STATE_INDEX}."));
            }
            if !seen.insert(state_ref.clone()) {
                return Err(format!("The {label} state {value} is listed more than once."));
            }
            Ok(state_ref)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::test_helpers::requests::RequestBuilder;

    fn normalizer() -> RequestNormalizer {
        RequestNormalizer::new(&UniquenessCheckerConfig::builder().max_states_per_request(3).max_output_states(5).build())
    }

    fn rejection(request: &UniquenessCheckRequest) -> MalformedRequest {
        normalizer().normalize(request).unwrap_err()
    }

    #[test]
    fn valid_write_request_is_normalized() {
        let request = RequestBuilder::write("SHA-256:A1").inputs(&["SHA-256:B2:0"]).references(&["SHA-256:C3:4"]).outputs(2).build();

        let internal = normalizer().normalize(&request).unwrap();
        assert_eq!(internal.transaction_id.to_string(), "SHA-256:A1");
        assert_eq!(internal.input_states, vec!["SHA-256:B2:0".parse::<StateRef>().unwrap()]);
        assert_eq!(internal.reference_states[0].index, 4);
        assert_eq!(internal.num_output_states, 2);
        assert_eq!(internal.check_type, UniquenessCheckType::Write);
    }

    #[test]
    fn unparseable_transaction_id_has_no_id_in_the_response() {
        let malformed = rejection(&RequestBuilder::write("not-a-hash").build());
        assert!(malformed.transaction_id.is_none());

        let response = malformed.into_response(datetime!(2024-01-01 00:00 UTC));
        assert!(matches!(response.result.error(), Some(UniquenessCheckError::MalformedRequest { .. })));
        assert_eq!(response.result.commit_timestamp(), datetime!(2024-01-01 00:00 UTC));
    }

    #[test]
    fn negative_output_count_is_rejected() {
        let malformed = rejection(&RequestBuilder::write("SHA-256:A1").outputs(-1).build());
        assert_eq!(malformed.error_text, "Number of output states cannot be less than 0.");
        assert_eq!(malformed.transaction_id.unwrap().to_string(), "SHA-256:A1");
    }

    #[test]
    fn limits_are_enforced() {
        let too_many_outputs = rejection(&RequestBuilder::write("SHA-256:A1").outputs(6).build());
        assert!(too_many_outputs.error_text.contains("exceeded the maximum limit (5)"));

        let too_many_states = rejection(
            &RequestBuilder::write("SHA-256:A1")
                .inputs(&["SHA-256:B2:0", "SHA-256:B2:1"])
                .references(&["SHA-256:C3:0", "SHA-256:C3:1"])
                .build(),
        );
        assert_eq!(
            too_many_states.error_text,
            "Number of input + reference states sent (4) exceeded the maximum limit (3)."
        );
    }

    #[test]
    fn bad_state_refs_are_rejected() {
        assert!(rejection(&RequestBuilder::write("SHA-256:A1").inputs(&["SHA-256:B2"]).build())
            .error_text
            .starts_with("Invalid input state ref"));
        assert!(rejection(&RequestBuilder::write("SHA-256:A1").references(&["SHA-256:B2:x"]).build())
            .error_text
            .starts_with("Invalid reference state ref"));
        assert!(rejection(&RequestBuilder::write("SHA-256:A1").inputs(&["SHA-256:B2:0", "SHA-256:B2:0"]).build())
            .error_text
            .contains("listed more than once"));
    }

    #[test]
    fn state_index_beyond_the_storable_range_is_rejected() {
        let too_large = format!("SHA-256:B2:{}", u64::from(MAX_STATE_INDEX) + 1);
        let malformed = rejection(&RequestBuilder::write("SHA-256:A1").inputs(&[too_large.as_str()]).build());
        assert_eq!(
            malformed.error_text,
            format!("Invalid input state ref {too_large}: output index exceeds {MAX_STATE_INDEX}.")
        );

        let largest = format!("SHA-256:B2:{MAX_STATE_INDEX}");
        let internal = normalizer().normalize(&RequestBuilder::write("SHA-256:A1").references(&[largest.as_str()]).build()).unwrap();
        assert_eq!(internal.reference_states[0].index, MAX_STATE_INDEX);
    }

    #[test]
    fn write_requires_an_upper_bound_but_read_does_not() {
        let write = RequestBuilder::write("SHA-256:A1").no_upper_bound().build();
        assert_eq!(rejection(&write).error_text, "Time window upper bound is required for WRITE checks.");

        let read = RequestBuilder::read("SHA-256:A1").no_upper_bound().build();
        assert!(normalizer().normalize(&read).is_ok());
    }

    #[test]
    fn empty_identities_are_rejected() {
        let mut request = RequestBuilder::write("SHA-256:A1").build();
        request.originator_x500_name = " ".to_owned();
        assert_eq!(rejection(&request).error_text, "Originator x500 name cannot be empty.");
    }
}
