use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime, DateTimeFormat};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use libdispatch::{Job, Transfer, TransferError, UploadTarget, Uploaded};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Options {
    pub endpoint: Option<String>,
    pub region: String,
    pub force_path_style: bool,
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
}

/// Keys per `DeleteObjects` request, the S3 maximum.
const DELETE_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime>,
}

impl ObjectInfo {
    pub fn modified_rfc3339(&self) -> String {
        self.last_modified
            .and_then(|modified| modified.fmt(DateTimeFormat::DateTime).ok())
            .unwrap_or_else(|| "-".to_string())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    /// Key and reason for every object the store refused to delete
    pub failed: Vec<(String, String)>,
}

/// Uploads files to S3, using multipart uploads for anything larger than
/// one part.
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    endpoint: Option<String>,
    max_retries: u32,
    initial_retry_delay_ms: u64,
}

impl S3Uploader {
    pub async fn new(options: &S3Options) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(options.region.clone()));
        if let Some(endpoint) = &options.endpoint {
            loader = loader.endpoint_url(endpoint.as_str());
        }
        if let Some(timeout) = options.timeout {
            loader = loader.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        }
        let shared = loader.load().await;
        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(options.force_path_style)
            .build();

        Self {
            client: Client::from_conf(conf),
            endpoint: options.endpoint.clone(),
            max_retries: options.max_retries,
            initial_retry_delay_ms: options.initial_retry_delay_ms,
        }
    }

    pub async fn upload_file(
        &self,
        src: &Path,
        key: &str,
        target: &UploadTarget,
    ) -> Result<Uploaded, TransferError> {
        let mut file = File::open(src)
            .await
            .map_err(|source| TransferError::Open {
                path: src.to_path_buf(),
                source,
            })?;
        let size = file
            .metadata()
            .await
            .map_err(|source| TransferError::Stat {
                path: src.to_path_buf(),
                source,
            })?
            .len();

        let started = Instant::now();
        let part_size = target.part_size_bytes();
        let location = if size <= part_size {
            let mut data = Vec::with_capacity(size as usize);
            file.read_to_end(&mut data)
                .await
                .map_err(|source| TransferError::Read {
                    path: src.to_path_buf(),
                    source,
                })?;
            self.put_object(&target.bucket, key, data).await?
        } else {
            self.put_multipart(file, src, size, key, target).await?
        };

        Ok(Uploaded {
            location,
            size,
            elapsed: started.elapsed(),
        })
    }

    fn location(&self, bucket: &str, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
            None => format!("s3://{bucket}/{key}"),
        }
    }

    async fn execute_with_retry<T, E, R, F, Fut>(
        &self,
        operation: F,
        operation_name: &'static str,
    ) -> Result<T, TransferError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, SdkError<E, R>>>,
        E: std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let err = classify(operation_name, err);
                    if attempt > self.max_retries || err.is_cancelled() {
                        return Err(err);
                    }
                    let delay_ms = self.initial_retry_delay_ms * 2u64.pow(attempt - 1);
                    tracing::warn!(attempt, "{err}, retrying in {delay_ms}ms");
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> Result<String, TransferError> {
        let checksum = md5_base64(&data);
        self.execute_with_retry(
            || {
                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .content_md5(checksum.clone())
                    .body(ByteStream::from(data.clone()))
                    .send()
            },
            "put_object",
        )
        .await?;
        Ok(self.location(bucket, key))
    }

    async fn put_multipart(
        &self,
        mut file: File,
        src: &Path,
        size: u64,
        key: &str,
        target: &UploadTarget,
    ) -> Result<String, TransferError> {
        let bucket = target.bucket.as_str();
        let create = self
            .execute_with_retry(
                || {
                    self.client
                        .create_multipart_upload()
                        .bucket(bucket)
                        .key(key)
                        .send()
                },
                "create_multipart_upload",
            )
            .await?;
        let upload_id = create.upload_id().unwrap_or_default().to_string();

        let result = async {
            let parts = self
                .upload_parts(&mut file, src, size, key, &upload_id, target)
                .await?;
            let completed = CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build();
            self.execute_with_retry(
                || {
                    self.client
                        .complete_multipart_upload()
                        .bucket(bucket)
                        .key(key)
                        .upload_id(&upload_id)
                        .multipart_upload(completed.clone())
                        .send()
                },
                "complete_multipart_upload",
            )
            .await
        }
        .await;

        match result {
            Ok(output) => Ok(output
                .location()
                .map(str::to_string)
                .unwrap_or_else(|| self.location(bucket, key))),
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        upload_id = %upload_id,
                        "failed to abort multipart upload: {}",
                        DisplayErrorContext(&abort_err)
                    );
                }
                if err.is_local() || err.is_cancelled() {
                    Err(err)
                } else {
                    Err(TransferError::MultipartAborted {
                        upload_id,
                        message: err.to_string(),
                    })
                }
            }
        }
    }

    /// Reads the file part by part, keeping at most `target.concurrency`
    /// parts in flight.
    async fn upload_parts(
        &self,
        file: &mut File,
        src: &Path,
        size: u64,
        key: &str,
        upload_id: &str,
        target: &UploadTarget,
    ) -> Result<Vec<CompletedPart>, TransferError> {
        let part_size = target.part_size_bytes();
        let buffer_size = part_size.min(size) as usize;
        let permits = Arc::new(Semaphore::new(target.concurrency.max(1)));
        let mut uploads = JoinSet::new();
        let mut parts = Vec::new();
        let mut part_number = 1i32;

        loop {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|err| TransferError::Cancelled(format!("part limiter: {err}")))?;

            let mut data = Vec::with_capacity(buffer_size);
            (&mut *file)
                .take(part_size)
                .read_to_end(&mut data)
                .await
                .map_err(|source| TransferError::Read {
                    path: src.to_path_buf(),
                    source,
                })?;
            if data.is_empty() {
                break;
            }

            let uploader = self.clone();
            let bucket = target.bucket.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            uploads.spawn(async move {
                let _permit = permit;
                uploader
                    .upload_part(bucket, key, upload_id, part_number, data)
                    .await
            });
            part_number += 1;

            while let Some(done) = uploads.try_join_next() {
                parts.push(joined(done)?);
            }
        }

        while let Some(done) = uploads.join_next().await {
            parts.push(joined(done)?);
        }
        parts.sort_by_key(|part| part.part_number());
        tracing::debug!(key, parts = parts.len(), "all parts uploaded");
        Ok(parts)
    }

    async fn upload_part(
        self,
        bucket: String,
        key: String,
        upload_id: String,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<CompletedPart, TransferError> {
        let checksum = md5_base64(&data);
        let resp = self
            .execute_with_retry(
                || {
                    self.client
                        .upload_part()
                        .bucket(&bucket)
                        .key(&key)
                        .upload_id(&upload_id)
                        .part_number(part_number)
                        .content_md5(checksum.clone())
                        .body(ByteStream::from(data.clone()))
                        .send()
                },
                "upload_part",
            )
            .await?;

        Ok(CompletedPart::builder()
            .part_number(part_number)
            .set_e_tag(resp.e_tag().map(str::to_string))
            .build())
    }
}

impl S3Uploader {
    /// Every object in `bucket` whose key starts with `prefix`, across all
    /// result pages.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, TransferError> {
        let mut request = self.client.list_objects_v2().bucket(bucket);
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        let mut pages = request.into_paginator().send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| classify("list_objects_v2", err))?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                    last_modified: object.last_modified().copied(),
                });
            }
        }
        tracing::debug!(bucket, prefix, objects = objects.len(), "listed objects");
        Ok(objects)
    }

    pub async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteReport, TransferError> {
        let mut report = DeleteReport::default();
        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| TransferError::Service {
                    operation: "delete_objects",
                    message: err.to_string(),
                })?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(false)
                .build()
                .map_err(|err| TransferError::Service {
                    operation: "delete_objects",
                    message: err.to_string(),
                })?;

            let output = self
                .execute_with_retry(
                    || {
                        self.client
                            .delete_objects()
                            .bucket(bucket)
                            .delete(delete.clone())
                            .send()
                    },
                    "delete_objects",
                )
                .await?;

            report.deleted.extend(
                output
                    .deleted()
                    .iter()
                    .filter_map(|deleted| deleted.key().map(str::to_string)),
            );
            report.failed.extend(output.errors().iter().map(|err| {
                (
                    err.key().unwrap_or_default().to_string(),
                    err.message()
                        .or(err.code())
                        .unwrap_or("unknown error")
                        .to_string(),
                )
            }));
        }
        Ok(report)
    }
}

#[async_trait]
impl Transfer for S3Uploader {
    async fn transfer(&self, job: &Job) -> Result<Uploaded, TransferError> {
        self.upload_file(job.source(), job.key(), job.target()).await
    }
}

fn md5_base64(data: &[u8]) -> String {
    let sum = md5::compute(data);
    B64.encode(sum.0)
}

fn joined(
    result: Result<Result<CompletedPart, TransferError>, JoinError>,
) -> Result<CompletedPart, TransferError> {
    result.map_err(|err| TransferError::Cancelled(format!("part upload task: {err}")))?
}

/// Maps an SDK failure onto the transfer error kinds. Timeouts count as
/// cancellation and are not retried.
fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> TransferError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::TimeoutError(_) => TransferError::Cancelled(format!("{operation}: {message}")),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            TransferError::Transport { operation, message }
        }
        _ => TransferError::Service { operation, message },
    }
}
