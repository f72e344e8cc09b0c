// Error types for the audio pipeline
//
// Every mutating or processing entry point returns a discrete error from the
// closed enumeration below instead of panicking. Warnings are non-fatal: the
// offending value is clamped and processing continues, but the caller is told
// via the warning variant.

/// Errors that can occur while configuring or driving the pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("unsupported component requested")]
    UnsupportedComponent,

    #[error("unsupported sample rate: {0} Hz")]
    BadSampleRate(u32),

    #[error("bad channel count: got {got}, expected {expected}")]
    BadNumberChannels { got: usize, expected: usize },

    #[error("bad buffer length: got {got} samples, expected {expected}")]
    BadDataLength { got: usize, expected: usize },

    #[error("invalid parameter: {0}")]
    BadParameter(String),

    #[error("required stream parameter was not set: {0}")]
    StreamParameterNotSet(&'static str),

    #[error("stage is not enabled: {0}")]
    NotEnabled(&'static str),

    // Non-fatal. The value was clamped into its valid range and the frame
    // (or setter) still took effect.
    #[error("stream parameter out of range, value was clamped: {0}")]
    BadStreamParameterWarning(&'static str),
}

impl Error {
    /// True for the non-fatal warning kind; the operation still took effect.
    pub fn is_warning(&self) -> bool {
        matches!(self, Error::BadStreamParameterWarning(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_classification() {
        assert!(Error::BadStreamParameterWarning("delay").is_warning());
        assert!(!Error::BadSampleRate(44100).is_warning());
        assert!(!Error::StreamParameterNotSet("analog level").is_warning());
    }

    #[test]
    fn test_error_display() {
        let err = Error::BadNumberChannels { got: 3, expected: 2 };
        assert_eq!(err.to_string(), "bad channel count: got 3, expected 2");
    }
}
