use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::storage::S3Options;

pub static DEFAULT_BUCKET: &str = "test-cbbackup";
static DEFAULT_REGION: &str = "us-east-1";
static INITIAL_RETRY_DELAY_MS: u64 = 100;

/// Persistent settings, stored with `confy`. Command-line flags win over
/// anything read from the file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SnowballConfig {
    /// S3-compatible endpoint, e.g. `http://10.0.0.5:8080` for a Snowball device
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Bucket used when a command does not name one
    pub bucket: String,
    pub force_path_style: bool,
    /// Per-operation timeout in seconds, 0 disables it
    pub timeout_secs: u64,
    /// Retries for a single request before the upload is given up
    pub max_retries: u32,
}

impl Default for SnowballConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: None,
            bucket: DEFAULT_BUCKET.to_string(),
            force_path_style: true,
            timeout_secs: 0,
            max_retries: 3,
        }
    }
}

impl SnowballConfig {
    const APP_NAME: &'static str = "snowball";
    const CONFIG_NAME: &'static str = "snowball";

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => confy::load_path::<Self>(path)
                .with_context(|| format!("failed to load config file `{}`", path.display())),
            None => confy::load::<Self>(Self::APP_NAME, Self::CONFIG_NAME).with_context(|| {
                format!(
                    "failed to load config file `{}.{}`",
                    Self::APP_NAME,
                    Self::CONFIG_NAME,
                )
            }),
        }
    }

    pub fn with_overrides(mut self, endpoint: Option<String>, region: Option<String>) -> Self {
        if endpoint.is_some() {
            self.endpoint = endpoint;
        }
        if region.is_some() {
            self.region = region;
        }
        self
    }

    pub fn bucket_or_default(&self, bucket: Option<String>) -> String {
        bucket.unwrap_or_else(|| self.bucket.clone())
    }

    pub fn s3_options(&self) -> S3Options {
        S3Options {
            endpoint: self.endpoint.clone(),
            region: self
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            force_path_style: self.force_path_style,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            max_retries: self.max_retries,
            initial_retry_delay_ms: INITIAL_RETRY_DELAY_MS,
        }
    }
}
