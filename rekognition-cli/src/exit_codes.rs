//! Exit codes following sysexits.h conventions.
//!
//! Scripts and cron jobs driving scans can tell a missing camera frame apart
//! from a Rekognition outage or a broken configuration.

use rekognition_core::RekognitionError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (unknown entity, bad arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Camera frame could not be retrieved or decoded.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Rekognition or Home Assistant unavailable.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const SERVICE_ERROR: i32 = 69;

/// Invalid or unreadable configuration.
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Classify by the first library error in the chain
        let code = match err
            .chain()
            .find_map(|cause| cause.downcast_ref::<RekognitionError>())
        {
            Some(RekognitionError::Config(_)) => CONFIG_ERROR,
            Some(RekognitionError::SourceUnavailable(_)) | Some(RekognitionError::Image(_)) => {
                INPUT_ERROR
            }
            Some(RekognitionError::Service(_)) | Some(RekognitionError::Http(_)) => SERVICE_ERROR,
            Some(_) => GENERAL_ERROR,
            None if err.downcast_ref::<UsageError>().is_some() => USAGE_ERROR,
            None => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

/// Error in the arguments rather than in a scan.
#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}
