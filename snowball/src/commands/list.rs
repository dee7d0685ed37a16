use anyhow::{Context, Result};
use std::io::{self, Write};

use crate::args::ListArgs;
use crate::config::SnowballConfig;
use crate::storage::{ObjectInfo, S3Uploader};

pub async fn list(config: &SnowballConfig, args: ListArgs) -> Result<()> {
    let bucket = config.bucket_or_default(args.bucket);
    let store = S3Uploader::new(&config.s3_options()).await;
    let mut objects = store
        .list_objects(&bucket, &args.prefix)
        .await
        .with_context(|| format!("failed to list objects in `{bucket}`"))?;

    sort_objects(&mut objects, args.group);
    write_listing(&mut io::stdout().lock(), &objects)?;
    Ok(())
}

/// Orders by key when `by_key` is set, oldest first otherwise.
pub fn sort_objects(objects: &mut [ObjectInfo], by_key: bool) {
    if by_key {
        objects.sort_by(|a, b| a.key.cmp(&b.key));
    } else {
        objects.sort_by_key(|object| {
            object
                .last_modified
                .map(|modified| (modified.secs(), modified.subsec_nanos()))
        });
    }
}

fn write_listing(out: &mut impl Write, objects: &[ObjectInfo]) -> io::Result<()> {
    for object in objects {
        writeln!(
            out,
            "Key: {:>15}, Modified: {}, Size: {}",
            object.key,
            object.modified_rfc3339(),
            object.size
        )?;
    }
    Ok(())
}
