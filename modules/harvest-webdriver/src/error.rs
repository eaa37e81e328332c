use fantoccini::error::{CmdError, ErrorStatus, NewSessionError};
use harvest_common::HarvestError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WebDriverError>;

#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("Could not start browser session: {0}")]
    Session(String),

    #[error("Element went stale: {0}")]
    Stale(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("WebDriver command failed: {0}")]
    Command(String),

    #[error("Script returned unexpected value: {0}")]
    Script(String),
}

impl From<NewSessionError> for WebDriverError {
    fn from(err: NewSessionError) -> Self {
        WebDriverError::Session(err.to_string())
    }
}

impl From<CmdError> for WebDriverError {
    fn from(err: CmdError) -> Self {
        if err.is_no_such_element() {
            return WebDriverError::NotFound(err.to_string());
        }
        match &err {
            CmdError::Standard(wd) if wd.error == ErrorStatus::StaleElementReference => {
                WebDriverError::Stale(err.to_string())
            }
            _ => WebDriverError::Command(err.to_string()),
        }
    }
}

impl From<WebDriverError> for HarvestError {
    fn from(err: WebDriverError) -> Self {
        match err {
            WebDriverError::Session(msg) => HarvestError::FatalSetup(msg),
            WebDriverError::Stale(_) | WebDriverError::NotFound(_) => {
                HarvestError::TransientExtraction(err.to_string())
            }
            WebDriverError::Command(_) | WebDriverError::Script(_) => {
                HarvestError::Environment(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_are_fatal() {
        let err: HarvestError = WebDriverError::Session("refused".into()).into();
        assert!(matches!(err, HarvestError::FatalSetup(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn element_errors_are_transient() {
        for err in [
            WebDriverError::Stale("row".into()),
            WebDriverError::NotFound("row".into()),
            WebDriverError::Command("click intercepted".into()),
        ] {
            assert!(HarvestError::from(err).is_transient());
        }
    }
}
