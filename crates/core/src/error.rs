use thiserror::Error;

/// Failures talking to the external `ffmpeg`/`ffprobe` binaries.
///
/// `ToolingUnavailable` is kept apart from `MalformedOutput` so callers never
/// confuse "the probe could not run" with "the probe ran and found nothing".
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{tool} is unavailable: {reason}")]
    ToolingUnavailable { tool: String, reason: String },
    #[error("unexpected output from {tool}: {reason}")]
    MalformedOutput { tool: String, reason: String },
}

impl ProbeError {
    pub fn unavailable(tool: &str, reason: impl Into<String>) -> Self {
        Self::ToolingUnavailable {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(tool: &str, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{encoder} has no rate control mode named {mode:?} (expected one of {expected})")]
    UnknownMode {
        encoder: &'static str,
        mode: String,
        expected: String,
    },
}

/// Invalid selections made in a configuration [`Session`](crate::session::Session)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("video codec {0:?} is not available in this ffmpeg build")]
    UnknownCodec(String),
    #[error("codec {codec} has no encoder named {encoder:?}")]
    UnsupportedEncoder { codec: String, encoder: String },
    #[error("encoder {0} has no rate control modes")]
    NoPolicy(String),
    #[error("{encoder} picks passes through its rate control mode (one of {modes})")]
    PassesOwnedByPolicy { encoder: String, modes: String },
    #[error(transparent)]
    Policy(#[from] PolicyError),
}
