mod committer;
mod detector;
mod normalizer;
mod partitioner;
mod retry;

pub use committer::ResultCommitter;
pub use detector::{ConflictDetector, DecisionCaches, DecisionKind, RequestDecision, StateWrites};
pub use normalizer::{MalformedRequest, RequestNormalizer};
pub use partitioner::{BatchPartitioner, SubBatch};
pub use retry::{RetryCoordinator, SubBatchOutcome};
