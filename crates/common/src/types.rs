//! Core scalar types shared between the session and platform backends.

/// Presentation timestamp in stream time-base units.
///
/// Only the ordering matters to the decode queue; the unit is whatever the
/// consumer submits.
pub type Pts = i64;

/// Status code returned by the platform decoder — 0 means success.
pub type OsStatus = i32;

/// Success status code.
pub const DECODER_NO_ERR: OsStatus = 0;

/// The platform has no hardware decoder available.
pub const DECODER_HARDWARE_NOT_SUPPORTED: OsStatus = -12470;

/// The requested source format cannot be decoded.
pub const DECODER_FORMAT_NOT_SUPPORTED: OsStatus = -12471;

/// The configuration payload was rejected (bad dimensions or extradata).
pub const DECODER_CONFIGURATION_ERR: OsStatus = -12472;

/// Generic decode failure, also reported for calls on a torn-down decoder.
pub const DECODER_FAILED: OsStatus = -12473;

/// Convert a platform status to a Result, keeping the raw code on failure.
pub fn check_status(status: OsStatus) -> Result<(), OsStatus> {
    if status == DECODER_NO_ERR {
        Ok(())
    } else {
        Err(status)
    }
}

/// Short human-readable name for the well-known platform status codes.
pub fn status_name(status: OsStatus) -> &'static str {
    match status {
        DECODER_NO_ERR => "no error",
        DECODER_HARDWARE_NOT_SUPPORTED => "hardware not supported",
        DECODER_FORMAT_NOT_SUPPORTED => "format not supported",
        DECODER_CONFIGURATION_ERR => "configuration error",
        DECODER_FAILED => "decoder failed",
        _ => "unknown platform status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_status_success() {
        assert!(check_status(DECODER_NO_ERR).is_ok());
    }

    #[test]
    fn check_status_failure_keeps_code() {
        assert_eq!(check_status(DECODER_FAILED), Err(DECODER_FAILED));
    }

    #[test]
    fn status_names() {
        assert_eq!(status_name(DECODER_CONFIGURATION_ERR), "configuration error");
        assert_eq!(status_name(42), "unknown platform status");
    }
}
