use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("invalid dispatcher config: {0}")]
    InvalidConfig(String),

    #[error("job queue is closed")]
    QueueClosed,
}

/// Failure of a single upload. Workers log it and move on; it never reaches
/// the producer.
#[derive(Error, Debug)]
pub enum TransferError {
    // Local failures, raised before anything is sent
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // Remote failures
    #[error("{operation} rejected by service: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} failed in transport: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("multipart upload {upload_id} aborted: {message}")]
    MultipartAborted { upload_id: String, message: String },

    #[error("upload canceled: {0}")]
    Cancelled(String),
}

impl TransferError {
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::Stat { .. } | Self::Read { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_kinds() {
        let open = TransferError::Open {
            path: PathBuf::from("/data/a.bin"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(open.is_local());
        assert!(!open.is_cancelled());
        assert_eq!(open.to_string(), "cannot open /data/a.bin: no such file");

        let cancelled = TransferError::Cancelled("operation timed out".into());
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_local());

        let aborted = TransferError::MultipartAborted {
            upload_id: "u-1".into(),
            message: "part 3 failed".into(),
        };
        assert!(!aborted.is_local());
        assert_eq!(
            aborted.to_string(),
            "multipart upload u-1 aborted: part 3 failed"
        );
    }
}
