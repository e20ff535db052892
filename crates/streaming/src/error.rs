use foundation::TileIndex;
use thiserror::Error;

/// Why a single tile did not load.
///
/// Errors stay attached to their tile record; nothing here aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("tile service answered HTTP {status}")]
    Http { status: u16 },
    #[error("could not decode tile response: {0}")]
    Decode(String),
    #[error("zoom {z} outside provider range {min}..={max}")]
    InvalidZoom { z: u8, min: u8, max: u8 },
    #[error("tile {index} lies outside its zoom level's grid")]
    InvalidIndex { index: TileIndex },
    #[error("request cancelled")]
    Cancelled,
    #[error("batch exceeds the {cap}-tile cap")]
    BatchOverflow { cap: usize },
    #[error("no response within {ms} ms")]
    Timeout { ms: u64 },
}

impl TileError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TileError::Transport(_) | TileError::Timeout { .. } => true,
            TileError::Http { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TileError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TileError::Timeout { ms: 0 }
        } else if e.is_decode() {
            TileError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            TileError::Http {
                status: status.as_u16(),
            }
        } else {
            TileError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TileError;

    #[test]
    fn only_transient_failures_retry() {
        assert!(TileError::Transport("reset".into()).is_retryable());
        assert!(TileError::Timeout { ms: 10_000 }.is_retryable());
        assert!(TileError::Http { status: 503 }.is_retryable());
        assert!(!TileError::Http { status: 404 }.is_retryable());
        assert!(!TileError::Cancelled.is_retryable());
        assert!(!TileError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn messages_name_the_limits() {
        let e = TileError::InvalidZoom { z: 20, min: 1, max: 16 };
        assert_eq!(e.to_string(), "zoom 20 outside provider range 1..=16");
        let e = TileError::InvalidIndex {
            index: foundation::TileIndex::new(8, 0, 3),
        };
        assert_eq!(e.to_string(), "tile 3/8/0 lies outside its zoom level's grid");
        assert!(!e.is_retryable());
        assert_eq!(
            TileError::BatchOverflow { cap: 64 }.to_string(),
            "batch exceeds the 64-tile cap"
        );
    }
}
