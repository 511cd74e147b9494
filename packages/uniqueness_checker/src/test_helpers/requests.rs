use time::{macros::datetime, OffsetDateTime};

use crate::model::{HoldingIdentity, UniquenessCheckRequest, UniquenessCheckType};

pub const DEFAULT_UPPER_BOUND: OffsetDateTime = datetime!(2100-01-01 00:00 UTC);

pub fn alice() -> HoldingIdentity {
    HoldingIdentity::new("O=Alice, L=London, C=GB", "test-group")
}

pub fn bob() -> HoldingIdentity {
    HoldingIdentity::new("O=Bob, L=Paris, C=FR", "test-group")
}

/// Transaction id in text form, distinct for every `n`.
pub fn tx_id(n: u32) -> String {
    format!("SHA-256:{n:08X}")
}

/// Output `index` of the transaction `tx_id(n)`, in text form.
pub fn state(n: u32, index: u32) -> String {
    format!("{}:{index}", tx_id(n))
}

pub struct RequestBuilder {
    request: UniquenessCheckRequest,
}

impl RequestBuilder {
    fn new(transaction_id: &str, check_type: UniquenessCheckType) -> Self {
        Self {
            request: UniquenessCheckRequest {
                holding_identity: alice(),
                originator_x500_name: "O=Originator, L=London, C=GB".to_owned(),
                transaction_id: transaction_id.to_owned(),
                input_states: vec![],
                reference_states: vec![],
                num_output_states: 0,
                time_window_lower_bound: None,
                time_window_upper_bound: Some(DEFAULT_UPPER_BOUND),
                check_type,
            },
        }
    }

    pub fn write(transaction_id: &str) -> Self {
        Self::new(transaction_id, UniquenessCheckType::Write)
    }

    pub fn read(transaction_id: &str) -> Self {
        Self::new(transaction_id, UniquenessCheckType::Read)
    }

    pub fn holding_identity(mut self, holding_identity: HoldingIdentity) -> Self {
        self.request.holding_identity = holding_identity;
        self
    }

    pub fn inputs<S: AsRef<str>>(mut self, states: &[S]) -> Self {
        self.request.input_states = states.iter().map(|s| s.as_ref().to_owned()).collect();
        self
    }

    pub fn references<S: AsRef<str>>(mut self, states: &[S]) -> Self {
        self.request.reference_states = states.iter().map(|s| s.as_ref().to_owned()).collect();
        self
    }

    pub fn outputs(mut self, num_output_states: i32) -> Self {
        self.request.num_output_states = num_output_states;
        self
    }

    pub fn lower_bound(mut self, lower_bound: OffsetDateTime) -> Self {
        self.request.time_window_lower_bound = Some(lower_bound);
        self
    }

    pub fn upper_bound(mut self, upper_bound: OffsetDateTime) -> Self {
        self.request.time_window_upper_bound = Some(upper_bound);
        self
    }

    pub fn no_upper_bound(mut self) -> Self {
        self.request.time_window_upper_bound = None;
        self
    }

    pub fn build(self) -> UniquenessCheckRequest {
        self.request
    }
}
