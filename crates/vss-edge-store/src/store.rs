//! The store implementation: pool construction, idempotent schema
//! creation, and the state transitions owned by each service.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::DatabaseErrorKind;
use tracing::{debug, info};

use vss_edge_core::EventDocument;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    DeviceStateRecord, EventRecord, KbMetaRecord, NewKbMeta, PendingUpload, PendingUploadRecord,
    StoredEvent, UploadFields, UploadStatus,
};
use crate::schema::{device_state, events, kb_meta, pending_uploads};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// KB version reported when no `record_kb_version` call has happened yet.
const INITIAL_KB_VERSION: &str = "0.0.0";

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS events (
    event_id    TEXT PRIMARY KEY,
    json        TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  TIMESTAMP NOT NULL,
    updated_at  TIMESTAMP NOT NULL
);
CREATE TABLE IF NOT EXISTS pending_uploads (
    upload_id        TEXT PRIMARY KEY,
    event_id         TEXT NOT NULL,
    filepath         TEXT NOT NULL,
    attempts         INTEGER NOT NULL DEFAULT 0,
    last_attempt_ts  TIMESTAMP,
    status           TEXT NOT NULL,
    checksum         TEXT,
    final_url        TEXT
);
CREATE INDEX IF NOT EXISTS idx_pending_uploads_status ON pending_uploads(status);
CREATE INDEX IF NOT EXISTS idx_pending_uploads_event ON pending_uploads(event_id);
CREATE TABLE IF NOT EXISTS kb_meta (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    kb_version  TEXT NOT NULL,
    applied_at  TIMESTAMP NOT NULL
);
CREATE TABLE IF NOT EXISTS device_state (
    device_id       TEXT PRIMARY KEY,
    last_heartbeat  TIMESTAMP NOT NULL,
    versions        TEXT NOT NULL DEFAULT '{}'
);
";

/// Pragmas applied to every pooled connection. WAL keeps the cooperating
/// services from blocking each other on short writes; the busy timeout
/// covers the rest.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Handle to the durable store. Cheap to clone; all methods are blocking
/// and are expected to run on a blocking-capable pool (`web::block`,
/// `spawn_blocking`) when called from async code.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    /// Open (creating parent directories as needed) the database file and
    /// build the connection pool.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.display().to_string());
        let pool = Pool::builder()
            .max_size(8)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .map_err(|e| StoreError::PoolCreation(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Create schema and indexes if absent. Idempotent.
    pub fn initialize(&self) -> StoreResult<()> {
        let mut conn = self.conn()?;
        conn.batch_execute(SCHEMA_SQL)?;
        info!("store schema initialized");
        Ok(())
    }

    fn conn(&self) -> StoreResult<PooledConnection<ConnectionManager<SqliteConnection>>> {
        self.pool
            .get()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    /// Atomic two-row insert: the event and its companion pending upload,
    /// both `PENDING_UPLOAD`. Returns `(event_id, upload_id)`. A duplicate
    /// `event_id` rejects the whole insert.
    pub fn insert_event(
        &self,
        document: &EventDocument,
        clip_path: &str,
    ) -> StoreResult<(String, String)> {
        let event_id = document.event_id.clone();
        let upload_id = format!("upload-{}", event_id);
        let json = serde_json::to_string(document)
            .map_err(|e| StoreError::CorruptDocument(e.to_string()))?;
        let now = Utc::now().naive_utc();

        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let event_record = EventRecord {
                event_id: event_id.clone(),
                json,
                status: UploadStatus::PendingUpload.as_str().to_string(),
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(events::table)
                .values(&event_record)
                .execute(conn)
                .map_err(|e| match e {
                    diesel::result::Error::DatabaseError(
                        DatabaseErrorKind::UniqueViolation,
                        _,
                    ) => StoreError::DuplicateEvent {
                        event_id: event_id.clone(),
                    },
                    other => StoreError::Query(other),
                })?;

            let upload_record = PendingUploadRecord {
                upload_id: upload_id.clone(),
                event_id: event_id.clone(),
                filepath: clip_path.to_string(),
                attempts: 0,
                last_attempt_ts: None,
                status: UploadStatus::PendingUpload.as_str().to_string(),
                checksum: None,
                final_url: None,
            };
            diesel::insert_into(pending_uploads::table)
                .values(&upload_record)
                .execute(conn)?;

            Ok(())
        })?;

        debug!(%event_id, %upload_id, "event enqueued for upload");
        Ok((event_id, upload_id))
    }

    /// Oldest rows still in `PENDING_UPLOAD`, up to `limit`. Upload ids
    /// embed the event timestamp, so lexical order is insertion order.
    pub fn list_pending_uploads(&self, limit: i64) -> StoreResult<Vec<PendingUpload>> {
        let mut conn = self.conn()?;
        let records = pending_uploads::table
            .filter(pending_uploads::status.eq(UploadStatus::PendingUpload.as_str()))
            .order(pending_uploads::upload_id.asc())
            .limit(limit)
            .load::<PendingUploadRecord>(&mut conn)?;
        Ok(records.into_iter().map(PendingUpload::from).collect())
    }

    /// The row lease: compare-and-set `PENDING_UPLOAD -> PROCESSING`,
    /// stamping `last_attempt_ts`. Returns false when another worker
    /// already owns the row.
    pub fn claim_upload(&self, upload_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let claimed = diesel::update(
            pending_uploads::table
                .filter(pending_uploads::upload_id.eq(upload_id))
                .filter(pending_uploads::status.eq(UploadStatus::PendingUpload.as_str())),
        )
        .set((
            pending_uploads::status.eq(UploadStatus::Processing.as_str()),
            pending_uploads::last_attempt_ts.eq(now),
        ))
        .execute(&mut conn)?;
        Ok(claimed == 1)
    }

    /// Update a pending upload's status plus any optional fields, stamping
    /// `last_attempt_ts`; terminal statuses are mirrored into the companion
    /// event in the same transaction. Rows already terminal never move
    /// again.
    pub fn update_upload(
        &self,
        upload_id: &str,
        status: UploadStatus,
        fields: UploadFields,
    ) -> StoreResult<()> {
        let now = Utc::now().naive_utc();
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let updated = diesel::update(
                pending_uploads::table
                    .filter(pending_uploads::upload_id.eq(upload_id))
                    .filter(
                        pending_uploads::status
                            .ne(UploadStatus::Uploaded.as_str())
                            .and(pending_uploads::status.ne(UploadStatus::Failed.as_str())),
                    ),
            )
            .set((
                pending_uploads::status.eq(status.as_str()),
                pending_uploads::last_attempt_ts.eq(now),
                &fields,
            ))
            .execute(conn)?;

            if updated == 0 {
                let current = pending_uploads::table
                    .filter(pending_uploads::upload_id.eq(upload_id))
                    .select(pending_uploads::status)
                    .first::<String>(conn)
                    .optional()?;
                return Err(match current {
                    None => StoreError::UploadNotFound {
                        upload_id: upload_id.to_string(),
                    },
                    Some(from) => StoreError::InvalidTransition {
                        upload_id: upload_id.to_string(),
                        from,
                        to: status.to_string(),
                    },
                });
            }

            if status.is_terminal() {
                let event_id = pending_uploads::table
                    .filter(pending_uploads::upload_id.eq(upload_id))
                    .select(pending_uploads::event_id)
                    .first::<String>(conn)?;
                diesel::update(
                    events::table
                        .filter(events::event_id.eq(event_id))
                        .filter(events::status.eq(UploadStatus::PendingUpload.as_str())),
                )
                .set((
                    events::status.eq(status.as_str()),
                    events::updated_at.eq(now),
                ))
                .execute(conn)?;
            }

            Ok(())
        })?;

        debug!(%upload_id, status = %status, "upload status updated");
        Ok(())
    }

    /// Replace the local upload id with the server-assigned one, persisting
    /// the checksum in the same write. Only legal while the row is
    /// `PROCESSING` (i.e. under the caller's lease).
    pub fn replace_upload_id(
        &self,
        local_upload_id: &str,
        server_upload_id: &str,
        checksum: &str,
    ) -> StoreResult<()> {
        if local_upload_id == server_upload_id {
            return self.set_checksum(local_upload_id, checksum);
        }

        let mut conn = self.conn()?;
        let updated = diesel::update(
            pending_uploads::table
                .filter(pending_uploads::upload_id.eq(local_upload_id))
                .filter(pending_uploads::status.eq(UploadStatus::Processing.as_str())),
        )
        .set((
            pending_uploads::upload_id.eq(server_upload_id),
            pending_uploads::checksum.eq(checksum),
        ))
        .execute(&mut conn)?;

        if updated == 0 {
            return Err(StoreError::UploadNotFound {
                upload_id: local_upload_id.to_string(),
            });
        }
        debug!(%local_upload_id, %server_upload_id, "server-assigned upload id recorded");
        Ok(())
    }

    fn set_checksum(&self, upload_id: &str, checksum: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            pending_uploads::table
                .filter(pending_uploads::upload_id.eq(upload_id))
                .filter(pending_uploads::status.eq(UploadStatus::Processing.as_str())),
        )
        .set(pending_uploads::checksum.eq(checksum))
        .execute(&mut conn)?;
        if updated == 0 {
            return Err(StoreError::UploadNotFound {
                upload_id: upload_id.to_string(),
            });
        }
        Ok(())
    }

    /// Startup recovery: rows a crashed run left in `PROCESSING` longer
    /// than `threshold` go back to `PENDING_UPLOAD`, attempts untouched.
    /// Returns the number of recovered rows.
    pub fn reset_stalled_uploads(&self, threshold: Duration) -> StoreResult<usize> {
        let cutoff = Utc::now().naive_utc()
            - chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::zero());
        let mut conn = self.conn()?;
        let reset = diesel::update(
            pending_uploads::table
                .filter(pending_uploads::status.eq(UploadStatus::Processing.as_str()))
                .filter(
                    pending_uploads::last_attempt_ts
                        .is_null()
                        .or(pending_uploads::last_attempt_ts.lt(cutoff)),
                ),
        )
        .set(pending_uploads::status.eq(UploadStatus::PendingUpload.as_str()))
        .execute(&mut conn)?;

        if reset > 0 {
            info!(count = reset, "reset stalled uploads to PENDING_UPLOAD");
        }
        Ok(reset)
    }

    /// Number of uploads currently in the given state; the uploader's
    /// `/health` endpoint reports these.
    pub fn count_uploads(&self, status: UploadStatus) -> StoreResult<i64> {
        let mut conn = self.conn()?;
        let count = pending_uploads::table
            .filter(pending_uploads::status.eq(status.as_str()))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    pub fn get_upload(&self, upload_id: &str) -> StoreResult<Option<PendingUpload>> {
        let mut conn = self.conn()?;
        let record = pending_uploads::table
            .filter(pending_uploads::upload_id.eq(upload_id))
            .first::<PendingUploadRecord>(&mut conn)
            .optional()?;
        Ok(record.map(PendingUpload::from))
    }

    pub fn get_event(&self, event_id: &str) -> StoreResult<Option<StoredEvent>> {
        let mut conn = self.conn()?;
        let record = events::table
            .filter(events::event_id.eq(event_id))
            .first::<EventRecord>(&mut conn)
            .optional()?;
        record.map(StoredEvent::try_from).transpose()
    }

    /// The current KB version: the most recently applied row, `"0.0.0"`
    /// when the log is empty.
    pub fn current_kb_version(&self) -> StoreResult<String> {
        let mut conn = self.conn()?;
        let latest = kb_meta::table
            .order((kb_meta::applied_at.desc(), kb_meta::id.desc()))
            .first::<KbMetaRecord>(&mut conn)
            .optional()?;
        Ok(latest
            .map(|row| row.kb_version)
            .unwrap_or_else(|| INITIAL_KB_VERSION.to_string()))
    }

    /// Append a newly applied KB version to the log.
    pub fn record_kb_version(&self, kb_version: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(kb_meta::table)
            .values(&NewKbMeta {
                kb_version: kb_version.to_string(),
                applied_at: Utc::now().naive_utc(),
            })
            .execute(&mut conn)?;
        info!(%kb_version, "kb version recorded");
        Ok(())
    }

    /// Stamp the device's last heartbeat, creating the singleton row on
    /// first use.
    pub fn record_heartbeat(&self, device_id: &str) -> StoreResult<()> {
        let now = Utc::now().naive_utc();
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let updated = diesel::update(
                device_state::table.filter(device_state::device_id.eq(device_id)),
            )
            .set(device_state::last_heartbeat.eq(now))
            .execute(conn)?;

            if updated == 0 {
                diesel::insert_into(device_state::table)
                    .values(&DeviceStateRecord {
                        device_id: device_id.to_string(),
                        last_heartbeat: now,
                        versions: "{}".to_string(),
                    })
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    /// Read one entry of the per-service version map.
    pub fn service_version(&self, device_id: &str, service: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn()?;
        let versions = device_state::table
            .filter(device_state::device_id.eq(device_id))
            .select(device_state::versions)
            .first::<String>(&mut conn)
            .optional()?;

        let Some(versions) = versions else {
            return Ok(None);
        };
        let map: serde_json::Value = serde_json::from_str(&versions)
            .map_err(|e| StoreError::CorruptDocument(format!("device versions: {e}")))?;
        Ok(map
            .get(service)
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    /// Record one entry of the per-service version map, creating the
    /// singleton row on first use.
    pub fn record_service_version(
        &self,
        device_id: &str,
        service: &str,
        version: &str,
    ) -> StoreResult<()> {
        let now = Utc::now().naive_utc();
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let existing = device_state::table
                .filter(device_state::device_id.eq(device_id))
                .select(device_state::versions)
                .first::<String>(conn)
                .optional()?;

            let mut map: serde_json::Map<String, serde_json::Value> = match &existing {
                Some(raw) => serde_json::from_str(raw)
                    .map_err(|e| StoreError::CorruptDocument(format!("device versions: {e}")))?,
                None => serde_json::Map::new(),
            };
            map.insert(
                service.to_string(),
                serde_json::Value::String(version.to_string()),
            );
            let serialized = serde_json::to_string(&map)
                .map_err(|e| StoreError::CorruptDocument(e.to_string()))?;

            if existing.is_some() {
                diesel::update(device_state::table.filter(device_state::device_id.eq(device_id)))
                    .set(device_state::versions.eq(serialized))
                    .execute(conn)?;
            } else {
                diesel::insert_into(device_state::table)
                    .values(&DeviceStateRecord {
                        device_id: device_id.to_string(),
                        last_heartbeat: now,
                        versions: serialized,
                    })
                    .execute(conn)?;
            }
            Ok(())
        })?;

        info!(%service, %version, "service version recorded");
        Ok(())
    }
}
