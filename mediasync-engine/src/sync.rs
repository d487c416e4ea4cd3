use crate::error::{AppError, Result};
use crate::hooks::HookRegistry;
use crate::repository::{RecordStore, RecordTx};
use crate::storage::{LocalStorage, MediaStorage};
use mediasync_core::{SyncReport, SyncRequest};
use std::sync::Arc;
use tokio::fs;

/// The migration runner: copies media files referenced by database
/// records from the local media root into the remote backend.
pub struct SyncRunner<S: RecordStore> {
    store: S,
    local: LocalStorage,
    remote: Arc<dyn MediaStorage>,
    hooks: HookRegistry,
}

impl<S: RecordStore> SyncRunner<S> {
    pub fn new(
        store: S,
        local: LocalStorage,
        remote: Arc<dyn MediaStorage>,
        hooks: HookRegistry,
    ) -> Self {
        Self {
            store,
            local,
            remote,
            hooks,
        }
    }

    /// Run one migration pass.
    ///
    /// Database mutations happen inside a single transaction that
    /// commits only after every record is processed; any error rolls
    /// them all back. Remote uploads and local deletions performed
    /// before the error stand — a re-run re-saves the same base names
    /// and converges.
    pub async fn run(&self, request: &SyncRequest) -> Result<SyncReport> {
        // Migrating into the default backend would re-save files onto
        // local storage; decided once, before anything is touched.
        if self.remote.tag().is_default() {
            return Err(AppError::DefaultStorage);
        }

        let target = &request.target;
        self.store.resolve(target).await?;
        let hook = self.hooks.get(target);

        let tx = self.store.begin().await?;
        let records = tx.fetch(target, &request.ids).await?;

        tracing::info!(
            "🔄 Syncing {} record(s) of {} (field {}) into {} storage",
            records.len(),
            target.label(),
            target.field,
            self.remote.tag()
        );

        let mut migrated = 0;
        let mut skipped = 0;
        let mut removed = 0;

        for record in records {
            // The local path derives from the media root alone,
            // whatever backend the field is configured with.
            let file_path = self.local.path(&record.file_name)?;

            if !file_path.exists() {
                tracing::warn!(
                    "File {} for {}(id={}, model={}) doesn't exist",
                    file_path.display(),
                    target.label(),
                    record.pk,
                    target.model
                );
                skipped += 1;
                continue;
            }

            let data = fs::read(&file_path).await?;
            let content_type = mime_guess::from_path(&file_path)
                .first()
                .map(|mime| mime.to_string());

            let base_name = file_path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    AppError::StorageError(format!("Invalid file name: {}", record.file_name))
                })?;

            let extra = hook
                .as_ref()
                .map(|h| h.add_metadata(&record))
                .unwrap_or_default();

            let stored = self
                .remote
                .save(base_name, content_type.as_deref(), data)
                .await?;

            if request.save {
                tx.update_file(target, record.pk, &stored, extra).await?;
            }

            if request.remove {
                self.local.delete(&record.file_name).await?;
                removed += 1;
            }

            tracing::info!(
                "File {} for {}(id={}, model={}) successfully uploaded into {} storage - {}",
                file_path.display(),
                target.label(),
                record.pk,
                target.model,
                self.remote.tag(),
                self.remote.url(&stored)
            );
            migrated += 1;
        }

        tx.commit().await?;

        Ok(SyncReport {
            migrated,
            skipped,
            removed,
            finished_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::MetadataHook;
    use async_trait::async_trait;
    use mediasync_core::{BackendTag, MediaRecord, ModelTarget};
    use sea_orm::Value;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory record store; mutations stage inside the "transaction"
    /// and only land on commit.
    #[derive(Clone, Default)]
    struct MemoryStore {
        rows: Arc<Mutex<BTreeMap<i64, String>>>,
        extras: Arc<Mutex<Vec<(i64, String, Value)>>>,
    }

    struct MemoryTx {
        rows: Arc<Mutex<BTreeMap<i64, String>>>,
        extras: Arc<Mutex<Vec<(i64, String, Value)>>>,
        staged: Mutex<Vec<(i64, String, Vec<(String, Value)>)>>,
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        type Tx = MemoryTx;

        async fn resolve(&self, _target: &ModelTarget) -> crate::error::Result<()> {
            Ok(())
        }

        async fn begin(&self) -> crate::error::Result<MemoryTx> {
            Ok(MemoryTx {
                rows: self.rows.clone(),
                extras: self.extras.clone(),
                staged: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RecordTx for MemoryTx {
        async fn fetch(
            &self,
            _target: &ModelTarget,
            ids: &[i64],
        ) -> crate::error::Result<Vec<MediaRecord>> {
            let rows = self.rows.lock().unwrap();
            let mut records = Vec::new();
            for (pk, name) in rows.iter() {
                if name.is_empty() {
                    continue;
                }
                if !ids.is_empty() && !ids.contains(pk) {
                    continue;
                }
                records.push(MediaRecord::new(*pk, name.clone()));
            }
            Ok(records)
        }

        async fn update_file(
            &self,
            _target: &ModelTarget,
            pk: i64,
            file_name: &str,
            extra: Vec<(String, Value)>,
        ) -> crate::error::Result<()> {
            self.staged
                .lock()
                .unwrap()
                .push((pk, file_name.to_string(), extra));
            Ok(())
        }

        async fn commit(self) -> crate::error::Result<()> {
            let staged = self.staged.into_inner().unwrap();
            let mut rows = self.rows.lock().unwrap();
            let mut extras = self.extras.lock().unwrap();
            for (pk, name, extra) in staged {
                rows.insert(pk, name);
                for (column, value) in extra {
                    extras.push((pk, column, value));
                }
            }
            Ok(())
        }
    }

    #[derive(Clone)]
    struct MemoryStorage {
        tag: BackendTag,
        saved: Arc<Mutex<Vec<(String, Option<String>)>>>,
    }

    impl MemoryStorage {
        fn with_tag(tag: BackendTag) -> Self {
            Self {
                tag,
                saved: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn saved_names(&self) -> Vec<String> {
            self.saved
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MediaStorage for MemoryStorage {
        fn tag(&self) -> BackendTag {
            self.tag
        }

        async fn save(
            &self,
            name: &str,
            content_type: Option<&str>,
            _data: Vec<u8>,
        ) -> crate::error::Result<String> {
            self.saved
                .lock()
                .unwrap()
                .push((name.to_string(), content_type.map(String::from)));
            Ok(format!("media/{}", name))
        }

        async fn delete(&self, _name: &str) -> crate::error::Result<()> {
            Ok(())
        }

        async fn exists(&self, name: &str) -> crate::error::Result<bool> {
            Ok(self.saved.lock().unwrap().iter().any(|(n, _)| n == name))
        }

        fn url(&self, name: &str) -> String {
            format!("https://bucket.example.com/{}", name)
        }
    }

    struct Fixture {
        temp: TempDir,
        store: MemoryStore,
        remote: MemoryStorage,
        runner: SyncRunner<MemoryStore>,
    }

    fn fixture(rows: &[(i64, &str)], hooks: HookRegistry) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::default();
        for (pk, name) in rows {
            store.rows.lock().unwrap().insert(*pk, name.to_string());
        }
        let remote = MemoryStorage::with_tag(BackendTag::S3);
        let runner = SyncRunner::new(
            store.clone(),
            LocalStorage::new(temp.path(), "/media"),
            Arc::new(remote.clone()),
            hooks,
        );
        Fixture {
            temp,
            store,
            remote,
            runner,
        }
    }

    fn write_local(fixture: &Fixture, name: &str) {
        let path = fixture.temp.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"image bytes").unwrap();
    }

    fn target() -> ModelTarget {
        ModelTarget::new("gallery", "photo", "image")
    }

    fn file_name_of(fixture: &Fixture, pk: i64) -> String {
        fixture.store.rows.lock().unwrap()[&pk].clone()
    }

    #[tokio::test]
    async fn test_migrates_existing_and_skips_missing() {
        let fixture = fixture(&[(1, "uploads/a.jpg"), (2, "uploads/b.jpg")], HookRegistry::new());
        write_local(&fixture, "uploads/a.jpg");
        // uploads/b.jpg is missing on disk

        let request = SyncRequest::new(target());
        let report = fixture.runner.run(&request).await.unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.removed, 0);

        // Record 1 points at the remote backend, record 2 is untouched
        assert_eq!(file_name_of(&fixture, 1), "media/a.jpg");
        assert_eq!(file_name_of(&fixture, 2), "uploads/b.jpg");

        // Content type was detected from the path
        assert_eq!(
            fixture.remote.saved.lock().unwrap()[0],
            ("a.jpg".to_string(), Some("image/jpeg".to_string()))
        );

        // remove defaults to false: the local file is still there
        assert!(fixture.temp.path().join("uploads/a.jpg").exists());
    }

    #[tokio::test]
    async fn test_remove_deletes_local_file() {
        let fixture = fixture(&[(1, "uploads/a.jpg")], HookRegistry::new());
        write_local(&fixture, "uploads/a.jpg");

        let mut request = SyncRequest::new(target());
        request.remove = true;
        let report = fixture.runner.run(&request).await.unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(report.removed, 1);
        assert!(!fixture.temp.path().join("uploads/a.jpg").exists());
    }

    #[tokio::test]
    async fn test_skip_save_uploads_without_persisting() {
        let fixture = fixture(&[(1, "uploads/a.jpg")], HookRegistry::new());
        write_local(&fixture, "uploads/a.jpg");

        let mut request = SyncRequest::new(target());
        request.save = false;
        let report = fixture.runner.run(&request).await.unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(fixture.remote.saved_names(), vec!["a.jpg"]);
        assert_eq!(file_name_of(&fixture, 1), "uploads/a.jpg");
    }

    #[tokio::test]
    async fn test_pk_restriction() {
        let fixture = fixture(&[(1, "uploads/a.jpg"), (2, "uploads/b.jpg")], HookRegistry::new());
        write_local(&fixture, "uploads/a.jpg");
        write_local(&fixture, "uploads/b.jpg");

        let mut request = SyncRequest::new(target());
        request.ids = vec![2];
        let report = fixture.runner.run(&request).await.unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(fixture.remote.saved_names(), vec!["b.jpg"]);
        assert_eq!(file_name_of(&fixture, 1), "uploads/a.jpg");
    }

    #[tokio::test]
    async fn test_default_backend_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::default();
        store
            .rows
            .lock()
            .unwrap()
            .insert(1, "uploads/a.jpg".to_string());
        let remote = MemoryStorage::with_tag(BackendTag::Local);
        let runner = SyncRunner::new(
            store.clone(),
            LocalStorage::new(temp.path(), "/media"),
            Arc::new(remote.clone()),
            HookRegistry::new(),
        );

        let result = runner.run(&SyncRequest::new(target())).await;
        assert!(matches!(result, Err(AppError::DefaultStorage)));

        // Nothing was uploaded or mutated
        assert!(remote.saved_names().is_empty());
        assert_eq!(store.rows.lock().unwrap()[&1], "uploads/a.jpg");
    }

    #[tokio::test]
    async fn test_records_processed_in_store_order() {
        let fixture = fixture(
            &[(3, "uploads/c.jpg"), (1, "uploads/a.jpg"), (2, "uploads/b.jpg")],
            HookRegistry::new(),
        );
        for name in ["uploads/a.jpg", "uploads/b.jpg", "uploads/c.jpg"] {
            write_local(&fixture, name);
        }

        fixture.runner.run(&SyncRequest::new(target())).await.unwrap();

        // Whatever order the store yields is the processing order
        assert_eq!(fixture.remote.saved_names(), vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    struct CaptionHook;

    impl MetadataHook for CaptionHook {
        fn add_metadata(&self, record: &MediaRecord) -> Vec<(String, Value)> {
            vec![(
                "caption".to_string(),
                format!("photo-{}", record.pk).into(),
            )]
        }
    }

    #[tokio::test]
    async fn test_hook_assignments_are_persisted() {
        let mut hooks = HookRegistry::new();
        hooks.register(&target(), Arc::new(CaptionHook));

        let fixture = fixture(&[(1, "uploads/a.jpg")], hooks);
        write_local(&fixture, "uploads/a.jpg");

        fixture.runner.run(&SyncRequest::new(target())).await.unwrap();

        let extras = fixture.store.extras.lock().unwrap();
        assert_eq!(
            *extras,
            vec![(
                1,
                "caption".to_string(),
                Value::from("photo-1".to_string())
            )]
        );
    }
}
