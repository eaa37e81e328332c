use thiserror::Error;

/// Result type alias for harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Error, Debug)]
pub enum HarvestError {
    /// A single item's fields could not be read. The item is skipped.
    #[error("Extraction error: {0}")]
    TransientExtraction(String),

    #[error("Environment action '{action}' timed out after {timeout_ms}ms")]
    EnvironmentTimeout { action: &'static str, timeout_ms: u64 },

    /// The environment never became usable. Aborts the whole run.
    #[error("Setup failed: {0}")]
    FatalSetup(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarvestError {
    /// Errors that only affect the item or pass in flight. The collector
    /// logs these and keeps going.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvestError::TransientExtraction(_)
                | HarvestError::EnvironmentTimeout { .. }
                | HarvestError::Environment(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_item_errors_are_transient() {
        assert!(HarvestError::TransientExtraction("gone".into()).is_transient());
        assert!(HarvestError::EnvironmentTimeout {
            action: "open",
            timeout_ms: 10
        }
        .is_transient());
        assert!(HarvestError::Environment("stale element".into()).is_transient());
    }

    #[test]
    fn setup_and_config_errors_are_not_transient() {
        assert!(!HarvestError::FatalSetup("list never rendered".into()).is_transient());
        assert!(!HarvestError::Config("bad date".into()).is_transient());
    }

    #[test]
    fn timeout_message_names_the_action() {
        let err = HarvestError::EnvironmentTimeout {
            action: "reveal",
            timeout_ms: 1500,
        };
        assert_eq!(
            err.to_string(),
            "Environment action 'reveal' timed out after 1500ms"
        );
    }
}
