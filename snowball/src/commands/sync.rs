use anyhow::{Context, Result};
use libdispatch::{Collector, Dispatcher, DispatcherConfig, UploadTarget};
use std::io::{self, Write};
use std::sync::Arc;

use crate::args::SyncArgs;
use crate::config::SnowballConfig;
use crate::progress::BarProgress;
use crate::scan::{ScannedFile, scan_dir};
use crate::storage::S3Uploader;

pub async fn sync(config: &SnowballConfig, args: SyncArgs) -> Result<()> {
    let bucket = config.bucket_or_default(args.bucket);
    let files = scan_dir(&args.src, &args.prefix)?;
    tracing::info!(
        src = %args.src.display(),
        files = files.len(),
        bucket = %bucket,
        "scanned source"
    );

    if args.dry_run {
        print_plan(&mut io::stdout().lock(), &bucket, &files)?;
        return Ok(());
    }

    let uploader = Arc::new(S3Uploader::new(&config.s3_options()).await);
    let dispatcher = Dispatcher::start(DispatcherConfig::new(args.forks, args.queue), uploader)
        .context("failed to start dispatcher")?;

    let progress = Arc::new(BarProgress::new(files.len() as u64)?);
    let mut collector = Collector::new(
        dispatcher.queue(),
        UploadTarget::new(bucket, args.part, args.threads),
        progress,
    );
    for file in files {
        collector
            .collect(file.path, file.key)
            .await
            .context("failed to queue file")?;
    }

    let attempted = collector.finish().await;
    dispatcher.shutdown().await;
    tracing::info!(attempted, "sync finished");
    Ok(())
}

/// Dry-run output: one line per file that would be uploaded.
fn print_plan(out: &mut impl Write, bucket: &str, files: &[ScannedFile]) -> io::Result<()> {
    for file in files {
        writeln!(
            out,
            "uploading {} to s3://{bucket}/{}",
            file.path.display(),
            file.key
        )?;
    }
    writeln!(out, "Done!")
}
