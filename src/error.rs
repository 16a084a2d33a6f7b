//! Error types for Refinery
//!
//! Centralized error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

/// All error types that can occur in Refinery
#[derive(Debug, Error)]
pub enum RefineryError {
    /// An expected source file was absent during rotation (recoverable)
    #[error("Artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// Rotation tried to write into a slot that already carries a manifest
    #[error("Archive slot {0} is already sealed")]
    SlotSealed(u32),

    /// The image model failed for one perspective; aborts the iteration
    #[error("Synthesis failed for '{perspective}': {reason}")]
    SynthesisFailed { perspective: String, reason: String },

    /// The visualization endpoint never answered
    #[error("Probe unreachable: {url} after {attempts} attempts")]
    ProbeUnreachable { url: String, attempts: u32 },

    /// The browser session itself could not be started
    #[error("Browser error: {0}")]
    Browser(String),

    /// The trainer subprocess could not be started
    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    /// The termination signal did not arrive within the configured bound
    #[error("Termination signal not received within {0}ms")]
    TerminationTimeout(u64),

    /// Notification listener error
    #[error("Notification error: {0}")]
    Notification(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RefineryError {
    /// Whether the orchestrator may log this error and keep going
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RefineryError::ArtifactMissing(_))
    }
}

/// Result type alias for Refinery operations
pub type Result<T> = std::result::Result<T, RefineryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_missing_error() {
        let err = RefineryError::ArtifactMissing(PathBuf::from("init/init_top.png"));
        assert_eq!(err.to_string(), "Artifact missing: init/init_top.png");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_synthesis_failed_error() {
        let err = RefineryError::SynthesisFailed {
            perspective: "Top".to_string(),
            reason: "out of memory".to_string(),
        };
        assert_eq!(err.to_string(), "Synthesis failed for 'Top': out of memory");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_probe_unreachable_error() {
        let err = RefineryError::ProbeUnreachable {
            url: "http://localhost:7007".to_string(),
            attempts: 20,
        };
        assert_eq!(
            err.to_string(),
            "Probe unreachable: http://localhost:7007 after 20 attempts"
        );
    }

    #[test]
    fn test_launch_failed_error() {
        let err = RefineryError::LaunchFailed("ns-train: not found".to_string());
        assert_eq!(err.to_string(), "Launch failed: ns-train: not found");
    }

    #[test]
    fn test_termination_timeout_error() {
        let err = RefineryError::TerminationTimeout(5000);
        assert_eq!(err.to_string(), "Termination signal not received within 5000ms");
    }

    #[test]
    fn test_slot_sealed_error() {
        let err = RefineryError::SlotSealed(3);
        assert_eq!(err.to_string(), "Archive slot 3 is already sealed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RefineryError = io_err.into();
        assert!(matches!(err, RefineryError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: RefineryError = json_err.into();
        assert!(matches!(err, RefineryError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(RefineryError::Config("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
