//! Error handling and exit codes.

use pagebump_memory::ArenaError;

/// Process exit codes.
pub mod exit_codes {
    /// Generic error.
    pub const ERROR_GENERIC: i32 = 1;
    /// An arena ran out of space under the `report` policy.
    pub const ERROR_EXHAUSTED: i32 = 2;
    /// Backing memory could not be reserved.
    pub const ERROR_RESERVE: i32 = 3;
    /// Invalid configuration.
    pub const ERROR_CONFIG: i32 = 4;
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A size argument could not be parsed.
    #[error("invalid size {input:?}: {reason}")]
    InvalidSize {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Map an application error to its exit code.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(arena) = cause.downcast_ref::<ArenaError>() {
            return match arena {
                ArenaError::Exhausted { .. } => exit_codes::ERROR_EXHAUSTED,
                ArenaError::Reserve { .. } | ArenaError::CapacityOverflow { .. } => {
                    exit_codes::ERROR_RESERVE
                }
                ArenaError::Layout(_) => exit_codes::ERROR_GENERIC,
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return exit_codes::ERROR_CONFIG;
        }
    }
    exit_codes::ERROR_GENERIC
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn error_codes() {
        let exhausted = anyhow::Error::new(ArenaError::Exhausted {
            size: 1,
            align: 1,
            remaining: 0,
        });
        assert_eq!(exit_code(&exhausted), 2);

        let overflow = anyhow::Error::new(ArenaError::CapacityOverflow { requested: 1 });
        assert_eq!(exit_code(&overflow), 3);

        let config = anyhow::Error::new(ConfigError::InvalidSize {
            input: "x".into(),
            reason: "bad".into(),
        });
        assert_eq!(exit_code(&config), 4);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn code_survives_context() {
        let err: anyhow::Result<()> = Err(ArenaError::Exhausted {
            size: 8,
            align: 8,
            remaining: 2,
        })
        .context("splitting <stdin>");
        assert_eq!(exit_code(&err.unwrap_err()), exit_codes::ERROR_EXHAUSTED);
    }

    #[test]
    fn failures_never_exit_zero() {
        let codes = [
            exit_codes::ERROR_GENERIC,
            exit_codes::ERROR_EXHAUSTED,
            exit_codes::ERROR_RESERVE,
            exit_codes::ERROR_CONFIG,
        ];
        assert!(codes.iter().all(|&c| c != 0));
        let reserve = anyhow::Error::new(ArenaError::Reserve {
            size: 4096,
            source: std::io::Error::other("no memory"),
        });
        assert_eq!(exit_code(&reserve), exit_codes::ERROR_RESERVE);
    }
}
