use crate::error::QbError;

/// What the statement builder does with a variadic parameter bound to zero
/// elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum EmptyInPolicy {
    /// Emit an empty group (`IN ()`) and run the query; it matches no rows.
    #[default]
    MatchNothing,
    /// Emit the empty group but skip the store and map an empty cursor.
    ShortCircuit,
    /// Fail the call with a malformed-argument error.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JournalMode {
    Delete,
    Wal,
    Memory,
}

impl JournalMode {
    pub fn as_pragma(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Wal => "WAL",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Runtime configuration for a [`crate::Database`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub empty_in_policy: EmptyInPolicy,
    /// Upper bound on bound arguments per statement. SQLite's default limit is
    /// 32766 host parameters.
    pub max_bound_args: usize,
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    pub foreign_keys: bool,
    /// Reject live-query registrations naming tables the store does not have.
    pub validate_observed_tables: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            empty_in_policy: EmptyInPolicy::MatchNothing,
            max_bound_args: 32_766,
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::Wal,
            foreign_keys: true,
            validate_observed_tables: true,
        }
    }
}

impl DatabaseConfig {
    pub fn production() -> Self {
        Self {
            empty_in_policy: EmptyInPolicy::MatchNothing,
            journal_mode: JournalMode::Wal,
            validate_observed_tables: true,
            ..Self::default()
        }
    }

    /// Lenient profile for tests and scratch databases: empty `IN` groups skip
    /// the store entirely and observed tables are not checked.
    pub fn development() -> Self {
        Self {
            empty_in_policy: EmptyInPolicy::ShortCircuit,
            journal_mode: JournalMode::Memory,
            validate_observed_tables: false,
            ..Self::default()
        }
    }

    pub fn with_empty_in_policy(mut self, policy: EmptyInPolicy) -> Self {
        self.empty_in_policy = policy;
        self
    }

    pub fn with_max_bound_args(mut self, max_bound_args: usize) -> Self {
        self.max_bound_args = max_bound_args;
        self
    }

    pub fn with_validate_observed_tables(mut self, validate: bool) -> Self {
        self.validate_observed_tables = validate;
        self
    }

    pub fn with_journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = journal_mode;
        self
    }

    pub fn validate(&self) -> Result<(), QbError> {
        if self.max_bound_args == 0 {
            return Err(QbError::InvalidConfig {
                message: "max_bound_args must be greater than zero".into(),
            });
        }
        // sqlite takes the timeout as a C int of milliseconds
        if self.busy_timeout_ms > i32::MAX as u64 {
            return Err(QbError::InvalidConfig {
                message: format!(
                    "busy_timeout_ms {} exceeds {}",
                    self.busy_timeout_ms,
                    i32::MAX
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DatabaseConfig, EmptyInPolicy};

    #[test]
    fn default_config_is_valid_and_matches_nothing_on_empty_lists() {
        let config = DatabaseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.empty_in_policy, EmptyInPolicy::MatchNothing);
    }

    #[test]
    fn zero_bound_args_is_rejected() {
        let err = DatabaseConfig::default()
            .with_max_bound_args(0)
            .validate()
            .expect_err("zero max_bound_args must fail");
        assert_eq!(err.code_str(), "invalid_config");
    }

    #[test]
    fn busy_timeout_must_fit_a_c_int() {
        let mut config = DatabaseConfig::default();
        config.busy_timeout_ms = i32::MAX as u64;
        assert!(config.validate().is_ok());

        config.busy_timeout_ms = u32::MAX as u64;
        let err = config.validate().expect_err("timeout above i32::MAX must fail");
        assert_eq!(err.code_str(), "invalid_config");
    }

    #[test]
    fn development_profile_short_circuits() {
        let config = DatabaseConfig::development();
        assert_eq!(config.empty_in_policy, EmptyInPolicy::ShortCircuit);
        assert!(!config.validate_observed_tables);
    }
}
