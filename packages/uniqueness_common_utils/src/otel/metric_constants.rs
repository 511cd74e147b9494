// prefix with the subsystem: uniqueness_

pub const METRIC_METER_NAME_UNIQUENESS_CHECKER: &str = "uniqueness_checker";

pub const METRIC_NAME_BATCH_SIZE: &str = "uniqueness_batch_size";
pub const METRIC_NAME_SUB_BATCH_SIZE: &str = "uniqueness_sub_batch_size";
pub const METRIC_NAME_SUB_BATCH_DURATION: &str = "uniqueness_sub_batch_duration";
pub const METRIC_NAME_SUB_BATCH_ATTEMPTS: &str = "uniqueness_sub_batch_attempts";
pub const METRIC_NAME_OUTCOME_COUNT: &str = "uniqueness_outcome_count";
pub const METRIC_NAME_STORAGE_ERROR_COUNT: &str = "uniqueness_storage_error_count";

pub const METRIC_KEY_HOLDING_IDENTITY: &str = "holding_identity";
pub const METRIC_KEY_OUTCOME: &str = "outcome";
pub const METRIC_KEY_ERROR_CATEGORY: &str = "error_category";
