//! libSQL backend — async `LeadStore` implementation.
//!
//! Supports local file and in-memory databases. One connection is opened at
//! startup and shared for the life of the process.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::leads::model::{Lead, NewLead, NotificationLog};
use crate::store::migrations;
use crate::store::traits::LeadStore;

/// libSQL database backend.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql Row to a Lead.
///
/// Column order matches LEAD_COLUMNS.
fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err("row_to_lead"))?;
    let received_str: String = row.get(8).map_err(query_err("row_to_lead"))?;
    let notifications_json = row
        .get::<Option<String>>(9)
        .map_err(query_err("row_to_lead"))?;

    let notifications = match notifications_json {
        Some(json) => Some(
            serde_json::from_str::<NotificationLog>(&json)
                .map_err(|e| DatabaseError::Serialization(format!("notifications: {e}")))?,
        ),
        None => None,
    };

    Ok(Lead {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("lead id: {e}")))?,
        name: row.get(1).map_err(query_err("row_to_lead"))?,
        phone: row.get(2).map_err(query_err("row_to_lead"))?,
        service: row.get(3).map_err(query_err("row_to_lead"))?,
        message: row.get(4).map_err(query_err("row_to_lead"))?,
        ip: row.get(5).map_err(query_err("row_to_lead"))?,
        user_agent: row.get(6).map_err(query_err("row_to_lead"))?,
        referrer: row.get(7).map_err(query_err("row_to_lead"))?,
        received_at: parse_datetime(&received_str),
        notifications,
    })
}

fn query_err(op: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

// ── Trait implementation ────────────────────────────────────────────

const LEAD_COLUMNS: &str =
    "id, name, phone, service, message, ip, user_agent, referrer, received_at, notifications";

#[async_trait]
impl LeadStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO leads (id, name, phone, service, message, ip, user_agent, referrer, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    lead.name.as_str(),
                    lead.phone.as_str(),
                    lead.service.as_str(),
                    lead.message.as_str(),
                    lead.ip.as_str(),
                    lead.user_agent.as_str(),
                    lead.referrer.as_str(),
                    lead.received_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err("create_lead"))?;

        debug!(lead_id = %id, "Lead inserted into DB");
        Ok(id)
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_lead"))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_lead: {e}"))),
        }
    }

    async fn update_notifications(
        &self,
        id: Uuid,
        log: &NotificationLog,
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(log)
            .map_err(|e| DatabaseError::Serialization(format!("notifications: {e}")))?;
        let updated_at = log.last_updated_at.unwrap_or_else(Utc::now).to_rfc3339();

        let changed = self
            .conn()
            .execute(
                "UPDATE leads SET notifications = ?1, notifications_updated_at = ?2 WHERE id = ?3",
                params![json, updated_at, id.to_string()],
            )
            .await
            .map_err(query_err("update_notifications"))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: id.to_string(),
            });
        }
        debug!(lead_id = %id, "Lead notifications updated in DB");
        Ok(())
    }

    async fn count_leads(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM leads", ())
            .await
            .map_err(query_err("count_leads"))?;
        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(query_err("count_leads"))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_leads: {e}"))),
        }
    }
}
