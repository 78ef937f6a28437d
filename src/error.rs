//! Error taxonomy
//!
//! Every failure in the engine degrades to a well-defined state. Nothing
//! here is meant to terminate the host process.

use thiserror::Error;

use crate::state::NavMode;

/// Malformed NFC payload. Decoding is all-or-nothing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("payload too short: {len} byte(s), need more than {header} header bytes")]
    TooShort { len: usize, header: usize },

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(String),

    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("unknown command kind: {0:?}")]
    UnknownKind(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl DecodeError {
    /// Human-readable reason suitable for display in the UI
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("corrupt snapshot under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Per-point routing failure. Never fatal to a tolerant setup.
#[derive(Debug, Error)]
pub enum RouteFetchError {
    #[error("directions service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed directions payload: {0}")]
    Malformed(String),

    #[error("no route between the requested points")]
    NoRoute,
}

impl From<reqwest::Error> for RouteFetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Offline region download failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegionError {
    #[error("region download failed: {0}")]
    Failed(String),

    #[error("progress stream ended before the pack completed")]
    StreamEnded,
}

/// Phase of the setup cycle in which a fatal error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPhase {
    Download,
    Fetch,
    Persist,
}

impl SetupPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Fetch => "fetch",
            Self::Persist => "persist",
        }
    }
}

impl std::fmt::Display for SetupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fatal setup failure. The cache is left untouched.
#[derive(Debug, Error)]
#[error("setup failed during {phase}: {reason}")]
pub struct SetupError {
    pub phase: SetupPhase,
    pub reason: String,
}

impl SetupError {
    pub fn new(phase: SetupPhase, reason: impl Into<String>) -> Self {
        Self {
            phase,
            reason: reason.into(),
        }
    }
}

/// NFC transceiver failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NfcError {
    #[error("a scan is already in progress")]
    Busy,

    #[error("NFC is unavailable: {0}")]
    Unavailable(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error("tag read failed: {0}")]
    Read(String),
}

/// Result of feeding a command (or request) into the state machine
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no cached route for tag {tag_id}")]
    LookupMiss { tag_id: String },

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("cannot accept a command while {mode}")]
    Busy { mode: NavMode },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("cannot {event} while {from}")]
    InvalidTransition { from: NavMode, event: &'static str },

    #[error(transparent)]
    Nfc(#[from] NfcError),
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_error_names_phase() {
        let err = SetupError::new(SetupPhase::Download, "offline pack rejected");
        assert_eq!(
            err.to_string(),
            "setup failed during download: offline pack rejected"
        );
    }

    #[test]
    fn lookup_miss_names_tag() {
        let err = DispatchError::LookupMiss {
            tag_id: "exit_north".into(),
        };
        assert!(err.to_string().contains("exit_north"));
    }

    #[test]
    fn decode_error_converts_into_dispatch_error() {
        let err: DispatchError = DecodeError::UnknownKind("x".into()).into();
        assert!(matches!(err, DispatchError::Decode(DecodeError::UnknownKind(_))));
    }
}
