use crate::error::{AppError, Result};
use mediasync_core::BackendTag;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub media_root: String,
    pub media_url: String,
    pub storage_backend: BackendTag,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint_url: Option<String>,
    pub s3_key_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://mediasync.db".to_string()),

            media_root: env::var("MEDIA_ROOT").unwrap_or_else(|_| "./media".to_string()),

            media_url: env::var("MEDIA_URL").unwrap_or_else(|_| "/media".to_string()),

            storage_backend: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "local".to_string())
                .parse::<BackendTag>()
                .map_err(AppError::ConfigError)?,

            s3_bucket: env::var("S3_BUCKET").unwrap_or_default(),

            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),

            s3_endpoint_url: env::var("S3_ENDPOINT_URL").ok(),

            s3_key_prefix: env::var("S3_KEY_PREFIX").unwrap_or_else(|_| "media".to_string()),
        })
    }
}
