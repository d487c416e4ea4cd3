use mediasync_core::{MediaRecord, ModelTarget};
use sea_orm::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Optional per-model capability invoked before a record is saved.
///
/// Best-effort contract: the returned column assignments are persisted
/// alongside the file-field update when the run saves records; nothing
/// more is promised.
pub trait MetadataHook: Send + Sync {
    fn add_metadata(&self, record: &MediaRecord) -> Vec<(String, Value)>;
}

/// Metadata hooks keyed by `app.Model` label. The runner performs one
/// capability lookup per run, not per record.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn MetadataHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: &ModelTarget, hook: Arc<dyn MetadataHook>) {
        self.hooks.insert(target.label(), hook);
    }

    pub fn get(&self, target: &ModelTarget) -> Option<Arc<dyn MetadataHook>> {
        self.hooks.get(&target.label()).cloned()
    }
}
