use anyhow::{Context, Result};
use libdispatch::UploadTarget;
use std::path::Path;

use crate::args::UploadArgs;
use crate::config::SnowballConfig;
use crate::storage::S3Uploader;

pub async fn upload(config: &SnowballConfig, args: UploadArgs) -> Result<()> {
    let bucket = config.bucket_or_default(args.bucket);
    let key = object_key(&args.src, args.dst);
    let target = UploadTarget::new(bucket, args.part, args.threads);

    let uploader = S3Uploader::new(&config.s3_options()).await;
    let uploaded = uploader
        .upload_file(&args.src, &key, &target)
        .await
        .with_context(|| format!("failed to upload `{}`", args.src.display()))?;

    println!("Uploaded");
    print!("{uploaded}");
    Ok(())
}

/// Destination key, the source path itself unless `dst` names one.
fn object_key(src: &Path, dst: Option<String>) -> String {
    dst.filter(|dst| !dst.is_empty())
        .unwrap_or_else(|| src.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_defaults_to_source() {
        let src = Path::new("/opt/couchbase/backup/full.cbb");
        assert_eq!(object_key(src, None), "/opt/couchbase/backup/full.cbb");
        assert_eq!(object_key(src, Some(String::new())), "/opt/couchbase/backup/full.cbb");
        assert_eq!(object_key(src, Some("2024/full.cbb".into())), "2024/full.cbb");
    }
}
