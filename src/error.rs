use std::io;
use thiserror::Error;

/// Failures reported by an I/Q source (hardware driver or replay file).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error while reading samples: {0}")]
    Io(#[from] io::Error),

    #[error("device error: {0}")]
    Device(String),

    #[error("unsupported source: {0}")]
    Unsupported(String),
}

impl SourceError {
    pub fn device<S: Into<String>>(msg: S) -> Self {
        SourceError::Device(msg.into())
    }
}

/// Failures reported by the spectrum output stage.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write spectrum: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode spectrum: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn io_error_converts_and_keeps_source() {
        let err: SourceError = io::Error::new(io::ErrorKind::UnexpectedEof, "short read").into();
        assert!(matches!(err, SourceError::Io(_)));
        assert!(err.to_string().contains("short read"));
        assert!(err.source().is_some());
    }

    #[test]
    fn device_error_display() {
        let err = SourceError::device("usb transfer failed");
        assert_eq!(err.to_string(), "device error: usb transfer failed");
    }

    #[test]
    fn sink_io_error_display() {
        let err: SinkError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert!(err.to_string().starts_with("failed to write spectrum"));
    }
}
