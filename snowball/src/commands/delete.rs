use anyhow::{Context, Result, bail};
use std::collections::HashSet;

use crate::args::DeleteArgs;
use crate::config::SnowballConfig;
use crate::storage::{ObjectInfo, S3Uploader};

pub async fn delete(config: &SnowballConfig, args: DeleteArgs) -> Result<()> {
    let bucket = config.bucket_or_default(args.bucket);
    let store = S3Uploader::new(&config.s3_options()).await;

    let listed = match args.prefix.as_deref().filter(|prefix| !prefix.is_empty()) {
        Some(prefix) => store
            .list_objects(&bucket, prefix)
            .await
            .with_context(|| format!("failed to list `{prefix}` in `{bucket}`"))?,
        None => Vec::new(),
    };
    let keys = keys_to_delete(args.keys, &listed);
    if keys.is_empty() {
        tracing::info!(bucket = %bucket, "nothing to delete");
        return Ok(());
    }

    let report = store
        .delete_objects(&bucket, &keys)
        .await
        .with_context(|| format!("failed to delete objects from `{bucket}`"))?;
    for key in &report.deleted {
        println!("Key {key} deleted.");
    }
    for (key, reason) in &report.failed {
        tracing::error!(key = %key, "delete failed: {reason}");
    }
    if !report.failed.is_empty() {
        bail!(
            "{} of {} objects could not be deleted",
            report.failed.len(),
            keys.len()
        );
    }
    Ok(())
}

/// Explicit keys first, then listed ones, without blanks or repeats.
pub fn keys_to_delete(explicit: Vec<String>, listed: &[ObjectInfo]) -> Vec<String> {
    let mut seen = HashSet::new();
    explicit
        .into_iter()
        .chain(listed.iter().map(|object| object.key.clone()))
        .filter(|key| !key.is_empty() && seen.insert(key.clone()))
        .collect()
}
