use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity tag of a storage backend.
///
/// `Local` is the system-wide default backend; migrating into it is a
/// misconfiguration and is rejected before any record is touched.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendTag {
    Local,
    S3,
}

impl BackendTag {
    /// Whether this tag names the default (local filesystem) backend.
    pub fn is_default(&self) -> bool {
        matches!(self, BackendTag::Local)
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendTag::Local => write!(f, "local"),
            BackendTag::S3 => write!(f, "s3"),
        }
    }
}

impl FromStr for BackendTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(BackendTag::Local),
            "s3" => Ok(BackendTag::S3),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// The app/model/field triple a sync run operates on.
///
/// The model name is normalized to capitalized form; the backing table
/// follows the `{app}_{model}` naming convention of the host
/// application's schema.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelTarget {
    pub app: String,
    pub model: String,
    pub field: String,
}

impl ModelTarget {
    pub fn new(app: &str, model: &str, field: &str) -> Self {
        ModelTarget {
            app: app.to_string(),
            model: capitalize(model),
            field: field.to_string(),
        }
    }

    /// Database table backing this model.
    pub fn table_name(&self) -> String {
        format!("{}_{}", self.app, self.model.to_lowercase())
    }

    /// Human-readable `app.Model` label used in logs and errors.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app, self.model)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Snapshot of one candidate record: its primary key and the current
/// value of the file-bearing column (the relative file name).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MediaRecord {
    pub pk: i64,
    pub file_name: String,
}

impl MediaRecord {
    pub fn new(pk: i64, file_name: impl Into<String>) -> Self {
        MediaRecord {
            pk,
            file_name: file_name.into(),
        }
    }
}

/// Invocation parameters for one sync run.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SyncRequest {
    pub target: ModelTarget,

    /// Restrict processing to these primary keys; empty means all
    /// records with the field set.
    pub ids: Vec<i64>,

    /// Delete the local file after a successful transfer.
    pub remove: bool,

    /// Persist the record after updating the file field.
    pub save: bool,
}

impl SyncRequest {
    pub fn new(target: ModelTarget) -> Self {
        SyncRequest {
            target,
            ids: Vec::new(),
            remove: false,
            save: true,
        }
    }
}

/// Summary of a completed sync run.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SyncReport {
    /// Records whose file was uploaded to the remote backend.
    pub migrated: u64,

    /// Records skipped because the local file was missing.
    pub skipped: u64,

    /// Local files deleted after transfer.
    pub removed: u64,

    pub finished_at: chrono::DateTime<chrono::Utc>,
}
