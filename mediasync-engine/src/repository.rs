use crate::error::{AppError, Result};
use async_trait::async_trait;
use mediasync_core::{MediaRecord, ModelTarget};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement,
    TransactionTrait, Value,
};

/// Source of candidate records for a sync run.
///
/// The seam exists so the runner can be exercised against an in-memory
/// store in tests; production uses [`SqlStore`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    type Tx: RecordTx;

    /// Verify the target model and field resolve against the
    /// database. Fails before any transaction opens.
    async fn resolve(&self, target: &ModelTarget) -> Result<()>;

    /// Open the transaction enclosing one whole run.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// One open transaction. Dropping it without `commit` rolls back
/// every mutation made through it.
#[async_trait]
pub trait RecordTx: Send {
    /// Candidate records: rows whose file field is set, optionally
    /// restricted to the given primary keys. No ordering is imposed;
    /// rows come back in default database order.
    async fn fetch(&self, target: &ModelTarget, ids: &[i64]) -> Result<Vec<MediaRecord>>;

    /// Point the record's file field at `file_name`, along with any
    /// extra column assignments contributed by a metadata hook.
    async fn update_file(
        &self,
        target: &ModelTarget,
        pk: i64,
        file_name: &str,
        extra: Vec<(String, Value)>,
    ) -> Result<()>;

    async fn commit(self) -> Result<()>;
}

/// sea-orm implementation over the host application's tables.
///
/// The table and column names are chosen at invocation time, so
/// queries are built as raw statements with validated identifiers
/// rather than through compiled-in entities.
pub struct SqlStore {
    db: DatabaseConnection,
}

impl SqlStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for SqlStore {
    type Tx = SqlTx;

    async fn resolve(&self, target: &ModelTarget) -> Result<()> {
        validate(target)?;

        let probe = format!(
            r#"SELECT "{}" FROM "{}" LIMIT 1"#,
            target.field,
            target.table_name()
        );
        self.db
            .query_one(Statement::from_string(
                self.db.get_database_backend(),
                probe,
            ))
            .await
            .map_err(|e| {
                tracing::debug!("Model probe for {} failed: {}", target.label(), e);
                AppError::ModelNotFound(format!("{} (field {})", target.label(), target.field))
            })?;

        Ok(())
    }

    async fn begin(&self) -> Result<SqlTx> {
        let backend = self.db.get_database_backend();
        let txn = self.db.begin().await?;
        Ok(SqlTx { txn, backend })
    }
}

pub struct SqlTx {
    txn: DatabaseTransaction,
    backend: DbBackend,
}

#[async_trait]
impl RecordTx for SqlTx {
    async fn fetch(&self, target: &ModelTarget, ids: &[i64]) -> Result<Vec<MediaRecord>> {
        validate(target)?;

        // "Field is set" filter; the file column holds a relative
        // name, so unset means NULL or empty.
        let mut sql = format!(
            r#"SELECT "id", "{field}" FROM "{table}" WHERE "{field}" IS NOT NULL AND "{field}" <> ''"#,
            field = target.field,
            table = target.table_name()
        );

        if !ids.is_empty() {
            let mut unique = ids.to_vec();
            unique.sort_unstable();
            unique.dedup();
            let list = unique
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(r#" AND "id" IN ({})"#, list));
        }

        let rows = self
            .txn
            .query_all(Statement::from_string(self.backend, sql))
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            // 32-bit serial primary keys decode as i32
            let pk = row
                .try_get::<i64>("", "id")
                .or_else(|_| row.try_get::<i32>("", "id").map(i64::from))?;
            let file_name = row.try_get::<String>("", &target.field)?;
            records.push(MediaRecord::new(pk, file_name));
        }

        Ok(records)
    }

    async fn update_file(
        &self,
        target: &ModelTarget,
        pk: i64,
        file_name: &str,
        extra: Vec<(String, Value)>,
    ) -> Result<()> {
        validate(target)?;

        let mut assignments = vec![format!(
            r#""{}" = {}"#,
            target.field,
            placeholder(self.backend, 1)
        )];
        let mut values: Vec<Value> = vec![file_name.to_owned().into()];

        for (column, value) in extra {
            ident(&column)?;
            assignments.push(format!(
                r#""{}" = {}"#,
                column,
                placeholder(self.backend, values.len() + 1)
            ));
            values.push(value);
        }

        let sql = format!(
            r#"UPDATE "{}" SET {} WHERE "id" = {}"#,
            target.table_name(),
            assignments.join(", "),
            placeholder(self.backend, values.len() + 1)
        );
        values.push(pk.into());

        self.txn
            .execute(Statement::from_sql_and_values(self.backend, &sql, values))
            .await?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }
}

fn validate(target: &ModelTarget) -> Result<()> {
    ident(&target.app)?;
    ident(&target.model)?;
    ident(&target.field)?;
    Ok(())
}

/// Identifiers are interpolated into SQL and must be plain
/// `[A-Za-z_][A-Za-z0-9_]*` names.
fn ident(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidIdentifier(name.to_string()))
    }
}

fn placeholder(backend: DbBackend, n: usize) -> String {
    match backend {
        DbBackend::Postgres => format!("${}", n),
        _ => "?".to_string(),
    }
}
