//! `SQLite` implementation of [`DeviceRepository`].
//!
//! Every write runs inside one transaction spanning the base table and the
//! device's variant table. On any error the transaction is rolled back
//! before the error is returned.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use devicehub_app::ports::DeviceRepository;
use devicehub_domain::device::Device;
use devicehub_domain::error::{ConcurrencyConflictError, DeviceHubError, ValidationError};
use devicehub_domain::id::DeviceId;
use devicehub_domain::version::RowVersion;

use crate::error::StorageError;
use crate::mapper::{self, JoinedRow};

/// `SQLite`-backed device repository.
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>, DeviceHubError> {
        Ok(self.pool.begin().await.map_err(StorageError::from)?)
    }
}

/// Commit on success, roll back on failure.
///
/// A failed rollback is logged and the original error returned.
async fn settle<T>(
    tx: Transaction<'_, Sqlite>,
    result: Result<T, DeviceHubError>,
) -> Result<T, DeviceHubError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(StorageError::from)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "failed to roll back transaction");
            }
            Err(err)
        }
    }
}

fn into_devices(rows: Vec<JoinedRow>) -> Result<Vec<Device>, DeviceHubError> {
    rows.into_iter().map(into_device).collect()
}

fn into_device(row: JoinedRow) -> Result<Device, DeviceHubError> {
    mapper::device_from_row(row)
        .inspect_err(|err| tracing::warn!(error = %err, "unclassifiable device row"))
        .map_err(DeviceHubError::from)
}

async fn fresh_row_version(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<RowVersion, DeviceHubError> {
    let version = mapper::read_row_version(conn, id)
        .await
        .map_err(StorageError::from)?
        .ok_or(StorageError::Database(sqlx::Error::RowNotFound))?;
    Ok(version)
}

/// A taken id on insert is the caller's fault; anything else is a store failure.
fn duplicate_or_storage(err: sqlx::Error, id: &str) -> DeviceHubError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            tracing::warn!(device_id = id, "device id already taken");
            ValidationError::DuplicateId(id.to_string()).into()
        }
        _ => StorageError::from(err).into(),
    }
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    device: &Device,
) -> Result<RowVersion, DeviceHubError> {
    let (base, variant) = mapper::to_rows(device);

    base.insert()
        .execute(&mut *conn)
        .await
        .map_err(|err| duplicate_or_storage(err, base.id))?;
    variant
        .insert(base.id)
        .execute(&mut *conn)
        .await
        .map_err(StorageError::from)?;

    fresh_row_version(conn, base.id).await
}

async fn update_rows(
    conn: &mut SqliteConnection,
    device: &Device,
) -> Result<RowVersion, DeviceHubError> {
    let expected = device
        .row_version
        .as_ref()
        .ok_or(ValidationError::MissingRowVersion)?;
    let (base, variant) = mapper::to_rows(device);

    let updated = base
        .update(expected)
        .execute(&mut *conn)
        .await
        .map_err(StorageError::from)?
        .rows_affected();
    if updated == 0 {
        let actual = mapper::read_row_version(conn, base.id)
            .await
            .map_err(StorageError::from)?;
        tracing::warn!(device_id = base.id, "row version mismatch on edit");
        return Err(ConcurrencyConflictError {
            id: base.id.to_string(),
            expected: expected.clone(),
            actual,
        }
        .into());
    }

    let updated = variant
        .update(base.id)
        .execute(&mut *conn)
        .await
        .map_err(StorageError::from)?
        .rows_affected();
    if updated == 0 {
        // The base row exists, so the device lives in another variant table.
        let row = mapper::fetch_by_id(conn, base.id)
            .await
            .map_err(StorageError::from)?
            .ok_or(StorageError::Database(sqlx::Error::RowNotFound))?;
        let stored = into_device(row)?;
        return Err(ValidationError::TypeChanged {
            stored: stored.device_type(),
            requested: device.device_type(),
        }
        .into());
    }

    fresh_row_version(conn, base.id).await
}

async fn delete_rows(conn: &mut SqliteConnection, id: &str) -> Result<(), DeviceHubError> {
    for statement in mapper::DELETE_BY_ID {
        sqlx::query(statement)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(StorageError::from)?;
    }
    Ok(())
}

impl DeviceRepository for SqliteDeviceRepository {
    #[tracing::instrument(skip(self, device), fields(device_id = %device.id))]
    async fn create(&self, device: Device) -> Result<Device, DeviceHubError> {
        let mut tx = self.begin().await?;
        let result = insert_rows(&mut *tx, &device).await;
        let row_version = settle(tx, result).await?;
        Ok(device.with_row_version(row_version))
    }

    #[tracing::instrument(skip(self))]
    async fn get_by_id(&self, id: DeviceId) -> Result<Option<Device>, DeviceHubError> {
        let row: Option<JoinedRow> = sqlx::query_as(mapper::SELECT_BY_ID)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        row.map(into_device).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn get_all(&self) -> Result<Vec<Device>, DeviceHubError> {
        let rows: Vec<JoinedRow> = sqlx::query_as(mapper::SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        into_devices(rows)
    }

    #[tracing::instrument(skip(self, device), fields(device_id = %device.id))]
    async fn edit(&self, device: Device) -> Result<Device, DeviceHubError> {
        let mut tx = self.begin().await?;
        let result = update_rows(&mut *tx, &device).await;
        let row_version = settle(tx, result).await?;
        Ok(device.with_row_version(row_version))
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, id: DeviceId) -> Result<(), DeviceHubError> {
        let mut tx = self.begin().await?;
        let result = delete_rows(&mut *tx, id.as_str()).await;
        settle(tx, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use devicehub_domain::device::{DeviceKind, DeviceType};
    use devicehub_domain::error::DataIntegrityError;

    async fn setup() -> (SqliteDeviceRepository, SqlitePool) {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        let pool = db.pool().clone();
        (SqliteDeviceRepository::new(pool.clone()), pool)
    }

    fn pc(os: Option<&str>) -> Device {
        Device::builder()
            .id("P-1")
            .name("Office PC")
            .enabled(true)
            .kind(DeviceKind::PersonalComputer {
                operating_system: os.map(str::to_string),
            })
            .build()
            .unwrap()
    }

    fn watch() -> Device {
        Device::builder()
            .id("SW-1")
            .name("Watch")
            .kind(DeviceKind::smartwatch(64))
            .build()
            .unwrap()
    }

    fn embedded() -> Device {
        Device::builder()
            .id("ED-1")
            .name("Gateway")
            .enabled(true)
            .kind(DeviceKind::Embedded {
                ip_address: "10.0.0.5".into(),
                network_name: "lan0".into(),
            })
            .build()
            .unwrap()
    }

    async fn count(pool: &SqlitePool, table: &str, id: &str) -> i64 {
        let column = if table == "device" { "id" } else { "device_id" };
        let (n,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?"))
                .bind(id)
                .fetch_one(pool)
                .await
                .unwrap();
        n
    }

    fn without_version(device: &Device) -> Device {
        Device {
            row_version: None,
            ..device.clone()
        }
    }

    #[tokio::test]
    async fn should_roundtrip_every_variant_through_create_and_get() {
        let (repo, _) = setup().await;

        for device in [pc(Some("Linux")), pc(None), watch(), embedded()] {
            let id = device.id.clone();
            repo.remove(id.clone()).await.unwrap();
            let created = repo.create(device.clone()).await.unwrap();
            let version = created.row_version.clone().unwrap();
            assert!(!version.is_empty());

            let fetched = repo.get_by_id(id).await.unwrap().unwrap();
            assert_eq!(without_version(&fetched), device);
            assert_eq!(fetched.row_version, Some(version));
        }
    }

    #[tokio::test]
    async fn should_return_none_when_device_not_found() {
        let (repo, _) = setup().await;
        let result = repo.get_by_id(DeviceId::new("P-404")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn should_list_all_devices() {
        let (repo, _) = setup().await;
        repo.create(pc(Some("Linux"))).await.unwrap();
        repo.create(watch()).await.unwrap();
        repo.create(embedded()).await.unwrap();

        let mut types: Vec<DeviceType> = repo
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(Device::device_type)
            .collect();
        types.sort_by_key(|t| t.as_str());

        assert_eq!(
            types,
            [
                DeviceType::Embedded,
                DeviceType::PersonalComputer,
                DeviceType::Smartwatch
            ]
        );
    }

    #[tokio::test]
    async fn should_not_persist_base_row_when_variant_insert_fails() {
        let (repo, pool) = setup().await;
        sqlx::query(
            "CREATE TRIGGER fail_embedded_insert BEFORE INSERT ON embedded
             BEGIN SELECT RAISE(ABORT, 'simulated fault'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = repo.create(embedded()).await;

        assert!(matches!(result, Err(DeviceHubError::Storage(_))));
        assert!(
            repo.get_by_id(DeviceId::new("ED-1"))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(count(&pool, "device", "ED-1").await, 0);
    }

    #[tokio::test]
    async fn should_reject_create_when_id_already_taken() {
        let (repo, _) = setup().await;
        repo.create(pc(None)).await.unwrap();
        let result = repo.create(pc(Some("Linux"))).await;
        assert!(matches!(
            result,
            Err(DeviceHubError::Validation(ValidationError::DuplicateId(ref id))) if id == "P-1"
        ));

        let stored = repo.get_by_id(DeviceId::new("P-1")).await.unwrap().unwrap();
        assert_eq!(
            stored.kind,
            DeviceKind::PersonalComputer {
                operating_system: None
            }
        );
    }

    #[tokio::test]
    async fn should_edit_and_issue_new_row_version() {
        let (repo, _) = setup().await;
        let created = repo.create(watch()).await.unwrap();
        let v1 = created.row_version.clone().unwrap();

        let mut update = created.clone();
        update.name = "Runner".into();
        update.kind = DeviceKind::smartwatch(12);
        let edited = repo.edit(update).await.unwrap();
        let v2 = edited.row_version.clone().unwrap();

        assert_ne!(v1, v2);
        let fetched = repo.get_by_id(DeviceId::new("SW-1")).await.unwrap().unwrap();
        assert_eq!(fetched, edited);
        assert_eq!(fetched.kind, DeviceKind::Smartwatch { battery_level: 12 });
    }

    #[tokio::test]
    async fn should_reject_second_edit_reusing_old_row_version() {
        let (repo, _) = setup().await;
        let created = repo.create(pc(Some("Linux"))).await.unwrap();
        let v1 = created.row_version.clone().unwrap();

        let mut first = created.clone();
        first.name = "First".into();
        let after_first = repo.edit(first).await.unwrap();

        let mut second = created.clone();
        second.name = "Second".into();
        second.kind = DeviceKind::PersonalComputer {
            operating_system: Some("Windows 11".into()),
        };
        let result = repo.edit(second).await;

        match result {
            Err(DeviceHubError::Conflict(err)) => {
                assert_eq!(err.id, "P-1");
                assert_eq!(err.expected, v1);
                assert_eq!(err.actual, after_first.row_version);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        let stored = repo.get_by_id(DeviceId::new("P-1")).await.unwrap().unwrap();
        assert_eq!(stored, after_first);
    }

    #[tokio::test]
    async fn should_let_only_one_of_two_concurrent_edits_succeed() {
        let (repo, _) = setup().await;
        let created = repo.create(watch()).await.unwrap();

        let mut left = created.clone();
        left.name = "Left".into();
        let mut right = created.clone();
        right.name = "Right".into();
        right.kind = DeviceKind::smartwatch(5);

        let (left, right) = tokio::join!(repo.edit(left), repo.edit(right));

        let (winner, loser) = match (left, right) {
            (Ok(winner), loser @ Err(_)) | (loser @ Err(_), Ok(winner)) => (winner, loser),
            other => panic!("expected exactly one edit to succeed, got {other:?}"),
        };
        assert!(matches!(loser, Err(DeviceHubError::Conflict(_))));
        let stored = repo.get_by_id(DeviceId::new("SW-1")).await.unwrap().unwrap();
        assert_eq!(stored, winner);
    }

    #[tokio::test]
    async fn should_report_conflict_without_actual_version_when_device_gone() {
        let (repo, _) = setup().await;
        let created = repo.create(embedded()).await.unwrap();
        repo.remove(DeviceId::new("ED-1")).await.unwrap();

        let result = repo.edit(created).await;

        assert!(matches!(
            result,
            Err(DeviceHubError::Conflict(ConcurrencyConflictError { actual: None, .. }))
        ));
    }

    #[tokio::test]
    async fn should_roll_back_base_update_when_variant_differs() {
        let (repo, _) = setup().await;
        let created = repo.create(pc(Some("Linux"))).await.unwrap();

        let forged = Device {
            name: "Now a watch".into(),
            kind: DeviceKind::Smartwatch { battery_level: 5 },
            ..created.clone()
        };
        let result = repo.edit(forged).await;

        assert!(matches!(
            result,
            Err(DeviceHubError::Validation(ValidationError::TypeChanged {
                stored: DeviceType::PersonalComputer,
                requested: DeviceType::Smartwatch,
            }))
        ));
        let stored = repo.get_by_id(DeviceId::new("P-1")).await.unwrap().unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn should_refresh_row_version_when_only_variant_row_changes() {
        let (repo, pool) = setup().await;
        let created = repo.create(embedded()).await.unwrap();

        sqlx::query("UPDATE embedded SET network_name = 'lan1' WHERE device_id = 'ED-1'")
            .execute(&pool)
            .await
            .unwrap();

        let fetched = repo.get_by_id(DeviceId::new("ED-1")).await.unwrap().unwrap();
        assert_ne!(fetched.row_version, created.row_version);
    }

    #[tokio::test]
    async fn should_remove_variant_and_base_rows() {
        let (repo, pool) = setup().await;
        repo.create(embedded()).await.unwrap();

        repo.remove(DeviceId::new("ED-1")).await.unwrap();

        assert_eq!(count(&pool, "embedded", "ED-1").await, 0);
        assert_eq!(count(&pool, "device", "ED-1").await, 0);
        assert!(
            repo.get_by_id(DeviceId::new("ED-1"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn should_ignore_remove_of_missing_device() {
        let (repo, _) = setup().await;
        repo.remove(DeviceId::new("P-404")).await.unwrap();
    }

    #[tokio::test]
    async fn should_surface_integrity_error_for_base_row_without_variant() {
        let (repo, pool) = setup().await;
        repo.create(watch()).await.unwrap();
        sqlx::query("INSERT INTO device (id, name, is_enabled) VALUES ('P-77', 'Ghost', 1)")
            .execute(&pool)
            .await
            .unwrap();

        let by_id = repo.get_by_id(DeviceId::new("P-77")).await;
        assert!(matches!(
            by_id,
            Err(DeviceHubError::DataIntegrity(DataIntegrityError::UnknownVariant { ref id }))
                if id == "P-77"
        ));

        let all = repo.get_all().await;
        assert!(matches!(all, Err(DeviceHubError::DataIntegrity(_))));
    }
}
