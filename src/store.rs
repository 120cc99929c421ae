use chrono::{SecondsFormat, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error};

use crate::{
    dto::{Coordinates, LocationRow},
    record::TelemetryRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Location store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Location append task failed: {0}")]
    Task(#[from] JoinError),
}

/// Append-only log of tracker reports. Rows are never updated or deleted, and
/// "latest" always means the highest insertion id for a device.
#[derive(Clone, Debug)]
pub struct LocationStore {
    pool: SqlitePool,
}

impl LocationStore {
    pub fn new(pool: SqlitePool) -> Self {
        LocationStore { pool }
    }

    /// Persist `record` as a new row stamped with the current UTC time.
    ///
    /// The write lock is taken with `BEGIN IMMEDIATE` before the timestamp is
    /// read, so insertion ids and `received_at` advance together even when
    /// several requests append at once. The transaction runs on its own task:
    /// dropping the returned future never leaves a pooled connection between
    /// `BEGIN` and `COMMIT`.
    pub async fn append(&self, record: &TelemetryRecord) -> Result<LocationRow, StoreError> {
        let pool = self.pool.clone();
        let record = record.clone();

        tokio::spawn(async move { append_in_transaction(&pool, &record).await }).await?
    }

    pub async fn latest_by_device(&self, device: &str) -> Result<Option<LocationRow>, StoreError> {
        Ok(sqlx::query_as::<_, LocationRow>(
            "SELECT id, device, lat, lon, alt, hdop, time, pressure, temp, received_at
             FROM locations
             WHERE device = ?
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(device)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn latest_coordinates(&self, device: &str) -> Result<Option<Coordinates>, StoreError> {
        Ok(sqlx::query_as::<_, Coordinates>(
            "SELECT lat, lon FROM locations WHERE device = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(device)
        .fetch_optional(&self.pool)
        .await?)
    }
}

async fn append_in_transaction(
    pool: &SqlitePool,
    record: &TelemetryRecord,
) -> Result<LocationRow, StoreError> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let inserted = insert_location(&mut conn, record).await;
    let finish = if inserted.is_ok() { "COMMIT" } else { "ROLLBACK" };

    if let Err(err) = sqlx::query(finish).execute(&mut *conn).await {
        error!("{} failed, discarding connection: {}", finish, err);
        // Closing the connection rolls back whatever is still open on it.
        drop(conn.detach());
        return Err(inserted.err().unwrap_or(err).into());
    }

    let row = inserted?;
    debug!("Appended location {} for device {:?}", row.id, row.device);
    Ok(row)
}

async fn insert_location(
    conn: &mut SqliteConnection,
    record: &TelemetryRecord,
) -> Result<LocationRow, sqlx::Error> {
    let received_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    sqlx::query_as::<_, LocationRow>(
        "INSERT INTO locations (device, lat, lon, alt, hdop, time, pressure, temp, received_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id, device, lat, lon, alt, hdop, time, pressure, temp, received_at",
    )
    .bind(record.device.as_deref())
    .bind(record.lat)
    .bind(record.lon)
    .bind(record.alt)
    .bind(record.hdop)
    .bind(record.time.as_deref())
    .bind(record.pressure)
    .bind(record.temp)
    .bind(received_at)
    .fetch_one(conn)
    .await
}
