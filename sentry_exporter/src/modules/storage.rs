use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use log::info;

use crate::config::StorageConfig;
use crate::modules::error::ExportError;

// Writes one CSV payload twice: a dated snapshot kept for backups and a
// fixed "latest" object that consumers read
pub struct CsvUploader {

    // S3 client for writing the export objects
    s3_client: S3Client,

    // Target bucket
    bucket: String,

    // Key naming tunables from Config.toml
    config: StorageConfig,
}

impl CsvUploader {
    pub fn new(s3_client: S3Client, bucket: String, config: StorageConfig) -> Self {
        Self {
            s3_client,
            bucket,
            config,
        }
    }

    pub async fn upload(&self, project_slug: &str, csv: &str) -> Result<(), ExportError> {
        let date = Utc::now().format("%Y-%m-%d");
        let snapshot_key = format!(
            "{}{}/events_{}.csv",
            project_slug, self.config.snapshot_suffix, date
        );
        self.put(&snapshot_key, csv).await?;

        let latest_key = format!("{}/events.csv", project_slug);
        self.put(&latest_key, csv).await
    }

    async fn put(&self, key: &str, body: &str) -> Result<(), ExportError> {
        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/csv")
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .send()
            .await
            .map_err(|e| ExportError::Storage(e.to_string()))?;

        info!("wrote s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
