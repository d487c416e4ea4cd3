use crate::error::{AppError, Result};
use crate::storage::MediaStorage;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use mediasync_core::BackendTag;

/// S3 object storage backend.
///
/// Works against AWS S3 or any S3-compatible provider via a custom
/// endpoint (MinIO, DigitalOcean Spaces, ...), in which case
/// path-style addressing is used.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    key_prefix: String,
}

impl S3Storage {
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        key_prefix: String,
    ) -> Result<Self> {
        if bucket.is_empty() {
            return Err(AppError::ConfigError(
                "S3_BUCKET must be set when the s3 backend is configured".to_string(),
            ));
        }

        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        // S3-compatible providers need a custom endpoint and path-style addressing
        let client = if let Some(ref endpoint) = endpoint_url {
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&config)
        };

        Ok(S3Storage {
            client,
            bucket,
            region,
            endpoint_url,
            key_prefix: key_prefix.trim_matches('/').to_string(),
        })
    }

    fn generate_key(&self, name: &str) -> String {
        if self.key_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.key_prefix, name)
        }
    }

    fn generate_url(&self, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, self.bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }
}

#[async_trait]
impl MediaStorage for S3Storage {
    fn tag(&self) -> BackendTag {
        BackendTag::S3
    }

    async fn save(&self, name: &str, content_type: Option<&str>, data: Vec<u8>) -> Result<String> {
        let key = self.generate_key(name);
        let size = data.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .set_content_type(content_type.map(String::from))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    "S3 upload failed"
                );
                AppError::StorageError(format!("S3 upload failed: {}", e))
            })?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            "S3 upload successful"
        );

        Ok(key)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %name, "S3 delete failed");
                AppError::StorageError(format!("S3 delete failed: {}", e))
            })?;

        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadObjectError::NotFound(_) => Ok(false),
                    _ => Err(AppError::StorageError(e.to_string())),
                },
                _ => Err(AppError::StorageError(e.to_string())),
            },
        }
    }

    fn url(&self, name: &str) -> String {
        self.generate_url(name)
    }
}
