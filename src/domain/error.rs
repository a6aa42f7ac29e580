//! Engine and CLI error types.
//!
//! Only configuration-class failures surface as errors (unknown strategy id,
//! missing benchmark ticker, unreachable store). Data gaps inside the
//! simulation are absorbed as skip-this-day semantics and never reach this
//! enum.

/// Top-level error type for boardwalk.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("strategy {id} not found in the strategy store")]
    UnknownStrategy { id: i64 },

    #[error("benchmark ticker '{ticker}' not present in the dataset")]
    MissingBenchmark { ticker: String },

    #[error("data store error: {reason}")]
    Store { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::Store { .. } => 3,
            EngineError::UnknownStrategy { .. } => 4,
            EngineError::MissingBenchmark { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::ExitCode;

    #[test]
    fn display_unknown_strategy() {
        let err = EngineError::UnknownStrategy { id: 42 };
        assert_eq!(
            err.to_string(),
            "strategy 42 not found in the strategy store"
        );
    }

    #[test]
    fn display_missing_benchmark() {
        let err = EngineError::MissingBenchmark {
            ticker: "SPY".into(),
        };
        assert_eq!(
            err.to_string(),
            "benchmark ticker 'SPY' not present in the dataset"
        );
    }

    #[test]
    fn exit_code_conversion_covers_all_classes() {
        let errors = [
            EngineError::UnknownStrategy { id: 1 },
            EngineError::MissingBenchmark { ticker: "SPY".into() },
            EngineError::Store { reason: "locked".into() },
            EngineError::ConfigMissing {
                section: "backtest".into(),
                key: "start_date".into(),
            },
        ];
        for err in &errors {
            let _: ExitCode = err.into();
        }
    }
}
