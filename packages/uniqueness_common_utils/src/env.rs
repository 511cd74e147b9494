//! Helpers to read configuration from environment variables.
//!
//! `env_var!` panics when the variable is missing, which is the expected behaviour while a
//! service boots. `env_var_with_defaults!` falls back to the supplied default when the variable
//! is missing or cannot be parsed into the requested type.

#[macro_export]
macro_rules! env_var {
    ($key: expr) => {
        std::env::var($key).unwrap_or_else(|_| panic!("{} environment variable is not defined", $key))
    };

    ($key: expr, $type: ty) => {{
        let value = std::env::var($key).unwrap_or_else(|_| panic!("{} environment variable is not defined", $key));
        value
            .parse::<$type>()
            .unwrap_or_else(|e| panic!("{} environment variable failed to parse with error {:?}", $key, e))
    }};
}

#[macro_export]
macro_rules! env_var_with_defaults {
    ($key: expr, $type: ty, $default: expr) => {
        match std::env::var($key) {
            Ok(value) => value.parse::<$type>().unwrap_or($default),
            Err(_) => $default,
        }
    };
}

/// Read an optional variable. Empty values are treated as absent.
#[macro_export]
macro_rules! env_var_optional {
    ($key: expr, $type: ty) => {
        match std::env::var($key) {
            Ok(value) if !value.trim().is_empty() => value.parse::<$type>().ok(),
            _ => None,
        }
    };
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn env_var_reads_and_parses() {
        env::set_var("UNIQ_TEST_ENV_VAR", "42");
        let as_string: String = env_var!("UNIQ_TEST_ENV_VAR");
        let as_number = env_var!("UNIQ_TEST_ENV_VAR", u32);

        assert_eq!(as_string, "42");
        assert_eq!(as_number, 42);
        env::remove_var("UNIQ_TEST_ENV_VAR");
    }

    #[test]
    #[serial]
    #[should_panic(expected = "UNIQ_TEST_ENV_VAR_MISSING environment variable is not defined")]
    fn env_var_panics_when_missing() {
        env::remove_var("UNIQ_TEST_ENV_VAR_MISSING");
        let _: String = env_var!("UNIQ_TEST_ENV_VAR_MISSING");
    }

    #[test]
    #[serial]
    fn env_var_with_defaults_falls_back() {
        env::remove_var("UNIQ_TEST_DEFAULTS");
        assert_eq!(env_var_with_defaults!("UNIQ_TEST_DEFAULTS", u64, 7), 7);

        env::set_var("UNIQ_TEST_DEFAULTS", "not-a-number");
        assert_eq!(env_var_with_defaults!("UNIQ_TEST_DEFAULTS", u64, 7), 7);

        env::set_var("UNIQ_TEST_DEFAULTS", "11");
        assert_eq!(env_var_with_defaults!("UNIQ_TEST_DEFAULTS", u64, 7), 11);
        env::remove_var("UNIQ_TEST_DEFAULTS");
    }

    #[test]
    #[serial]
    fn env_var_optional_treats_blank_as_none() {
        env::set_var("UNIQ_TEST_OPTIONAL", "  ");
        assert_eq!(env_var_optional!("UNIQ_TEST_OPTIONAL", u64), None);

        env::set_var("UNIQ_TEST_OPTIONAL", "250");
        assert_eq!(env_var_optional!("UNIQ_TEST_OPTIONAL", u64), Some(250));
        env::remove_var("UNIQ_TEST_OPTIONAL");
    }
}
