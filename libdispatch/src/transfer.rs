//! The upload operation a worker runs for each job.

use crate::error::TransferError;
use crate::job::Job;
use async_trait::async_trait;
use indicatif::HumanBytes;
use std::fmt;
use std::time::Duration;

/// Performs the actual upload of one job.
///
/// Implementations block the calling worker until the upload has either
/// finished or failed; the worker does not look past the error for anything
/// other than logging.
#[async_trait]
pub trait Transfer: Send + Sync + 'static {
    async fn transfer(&self, job: &Job) -> Result<Uploaded, TransferError>;
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub location: String,
    pub size: u64,
    pub elapsed: Duration,
}

impl Uploaded {
    /// Average throughput in MiB/s, zero for an instantaneous upload.
    pub fn bandwidth_mib(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.size as f64 / seconds / 1024.0 / 1024.0
    }
}

impl fmt::Display for Uploaded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Location     : {}", self.location)?;
        writeln!(f, "Size         : {}", HumanBytes(self.size))?;
        writeln!(f, "Elapsed time : {}", humanize_duration(self.elapsed))?;
        writeln!(f, "Bandwidth    : {:4.0} MBytes/sec", self.bandwidth_mib())
    }
}

/// Render a duration in the largest unit that keeps the value under 1000,
/// stopping at whole seconds.
pub fn humanize_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos < 1_000 {
        return format!("{nanos} nanoseconds");
    }
    let micros = duration.as_micros();
    if micros < 1_000 {
        return format!("{micros} microseconds");
    }
    let millis = duration.as_millis();
    if millis < 1_000 {
        return format!("{millis} milliseconds");
    }
    format!("{} seconds", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize_duration_units() {
        assert_eq!(humanize_duration(Duration::from_nanos(999)), "999 nanoseconds");
        assert_eq!(humanize_duration(Duration::from_nanos(1_500)), "1 microseconds");
        assert_eq!(humanize_duration(Duration::from_micros(250_000)), "250 milliseconds");
        assert_eq!(humanize_duration(Duration::from_millis(1_000)), "1 seconds");
        // minutes are still rendered as seconds
        assert_eq!(humanize_duration(Duration::from_secs(125)), "125 seconds");
    }

    #[test]
    fn test_uploaded_display() {
        let uploaded = Uploaded {
            location: "http://127.0.0.1:9000/test-cbbackup/a.cbb".into(),
            size: 64 * 1024 * 1024,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(uploaded.bandwidth_mib(), 32.0);
        let text = uploaded.to_string();
        assert!(text.contains("Location     : http://127.0.0.1:9000/test-cbbackup/a.cbb\n"));
        assert!(text.contains("Elapsed time : 2 seconds\n"));
        assert!(text.contains("Bandwidth    :   32 MBytes/sec\n"));
    }

    #[test]
    fn test_zero_elapsed_bandwidth() {
        let uploaded = Uploaded {
            location: String::new(),
            size: 10,
            elapsed: Duration::ZERO,
        };
        assert_eq!(uploaded.bandwidth_mib(), 0.0);
    }
}
