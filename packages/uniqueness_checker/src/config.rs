use tracing::debug;
use uniqueness_common_utils::{env_var_optional, env_var_with_defaults};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_MAX_STATES_PER_REQUEST: usize = 10_000;
pub const DEFAULT_MAX_OUTPUT_STATES: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquenessCheckerConfig {
    /// Attempts per sub-batch before it fails with an unhandled exception.
    /// - **Defaults to 10.**
    pub max_attempts: u32,
    /// Base wait before a retry. Attempt `n` waits `retry_backoff_ms * 2^(n-1)`, capped at 1s.
    /// - **Defaults to 0**, i.e. retry immediately.
    pub retry_backoff_ms: u64,
    /// Upper limit on input + reference states in a single request.
    /// - **Defaults to 10_000.**
    pub max_states_per_request: usize,
    /// Upper limit on the declared number of output states.
    /// - **Defaults to 10_000.**
    pub max_output_states: u32,
    /// Wall-clock budget of a whole `process_requests` call. Sub-batches still running when it
    /// expires are answered as if their retries were exhausted.
    /// - **Defaults to `None`**, no budget.
    pub call_timeout_ms: Option<u64>,
    /// Process the sub-batches of a call concurrently.
    /// - **Defaults to `true`.**
    pub parallel_partitions: bool,
}

impl Default for UniquenessCheckerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: 0,
            max_states_per_request: DEFAULT_MAX_STATES_PER_REQUEST,
            max_output_states: DEFAULT_MAX_OUTPUT_STATES,
            call_timeout_ms: None,
            parallel_partitions: true,
        }
    }
}

impl UniquenessCheckerConfig {
    /// Build the config using env. variables with defaults applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            max_attempts: env_var_with_defaults!("UNIQUENESS_MAX_ATTEMPTS", u32, defaults.max_attempts).max(1),
            retry_backoff_ms: env_var_with_defaults!("UNIQUENESS_RETRY_BACKOFF_MS", u64, defaults.retry_backoff_ms),
            max_states_per_request: env_var_with_defaults!("UNIQUENESS_MAX_STATES_PER_REQUEST", usize, defaults.max_states_per_request),
            max_output_states: env_var_with_defaults!("UNIQUENESS_MAX_OUTPUT_STATES", u32, defaults.max_output_states),
            call_timeout_ms: env_var_optional!("UNIQUENESS_CALL_TIMEOUT_MS", u64),
            parallel_partitions: env_var_with_defaults!("UNIQUENESS_PARALLEL_PARTITIONS", bool, defaults.parallel_partitions),
        };

        debug!("Uniqueness checker config loaded from environment variables: {config:?}");
        config
    }

    pub fn builder() -> UniquenessCheckerConfigBuilder {
        UniquenessCheckerConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct UniquenessCheckerConfigBuilder {
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    max_states_per_request: Option<usize>,
    max_output_states: Option<u32>,
    call_timeout_ms: Option<u64>,
    parallel_partitions: Option<bool>,
}

impl UniquenessCheckerConfigBuilder {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn retry_backoff_ms(mut self, retry_backoff_ms: u64) -> Self {
        self.retry_backoff_ms = Some(retry_backoff_ms);
        self
    }

    pub fn max_states_per_request(mut self, max_states_per_request: usize) -> Self {
        self.max_states_per_request = Some(max_states_per_request);
        self
    }

    pub fn max_output_states(mut self, max_output_states: u32) -> Self {
        self.max_output_states = Some(max_output_states);
        self
    }

    pub fn call_timeout_ms(mut self, call_timeout_ms: u64) -> Self {
        self.call_timeout_ms = Some(call_timeout_ms);
        self
    }

    pub fn parallel_partitions(mut self, parallel_partitions: bool) -> Self {
        self.parallel_partitions = Some(parallel_partitions);
        self
    }

    pub fn build(self) -> UniquenessCheckerConfig {
        let defaults = UniquenessCheckerConfig::default();
        UniquenessCheckerConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            retry_backoff_ms: self.retry_backoff_ms.unwrap_or(defaults.retry_backoff_ms),
            max_states_per_request: self.max_states_per_request.unwrap_or(defaults.max_states_per_request),
            max_output_states: self.max_output_states.unwrap_or(defaults.max_output_states),
            call_timeout_ms: self.call_timeout_ms.or(defaults.call_timeout_ms),
            parallel_partitions: self.parallel_partitions.unwrap_or(defaults.parallel_partitions),
        }
    }
}
