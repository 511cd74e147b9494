mod details;
mod identifiers;
mod request;
mod result;

pub use details::{RejectedTransactionDetails, StateDetails, TransactionDetails};
pub use identifiers::{HoldingIdentity, SecureHash, StateRef, MAX_STATE_INDEX};
pub use request::{UniquenessCheckRequest, UniquenessCheckRequestInternal, UniquenessCheckType};
pub use result::{OutcomeKind, UniquenessCheckError, UniquenessCheckResponse, UniquenessCheckResult};
