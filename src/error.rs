// Error types callers need to branch on

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value at '{path}': expected {expected}")]
    Invalid { path: String, expected: String },
}

impl ConfigError {
    pub fn invalid(path: impl Into<String>, expected: impl Into<String>) -> Self {
        ConfigError::Invalid {
            path: path.into(),
            expected: expected.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Server answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("I/O error while writing download: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download cancelled")]
    Cancelled,

    /// Raised by the transport after it already reported the transfer as finished
    #[error("Downloader failed after finishing: {0}")]
    AfterFinish(String),
}

impl DownloadError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DownloadError::Cancelled | DownloadError::AfterFinish(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(DownloadError::Transfer("reset".into()).is_retryable());
        assert!(
            DownloadError::Status {
                url: "http://x".into(),
                status: 502
            }
            .is_retryable()
        );
        assert!(!DownloadError::Cancelled.is_retryable());
        assert!(!DownloadError::AfterFinish("boom".into()).is_retryable());
    }

    #[test]
    fn test_invalid_message_names_path() {
        let err = ConfigError::invalid("settings.update_cooldown", "an integer");
        assert_eq!(
            err.to_string(),
            "Invalid config value at 'settings.update_cooldown': expected an integer"
        );
    }
}
