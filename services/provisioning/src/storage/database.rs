use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::quota::{QuotaStore, UNLIMITED};

use super::error::StorageError;
use super::schema::init_database;
use super::{DEFAULT_QUOTA_CLASS, PROVISIONING_DB_FILENAME};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub uuid: String,
    pub name: String,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub disabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct DomainUpdate {
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub uuid: String,
    pub username: String,
    pub domain_id: String,
    pub email_address: String,
    pub rpid: String,
    pub description: String,
    pub disabled: bool,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewSubscriber {
    pub username: String,
    pub domain_id: String,
    pub email_address: String,
    pub rpid: String,
    pub description: String,
    pub disabled: bool,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriberUpdate {
    pub email_address: Option<String>,
    pub rpid: Option<String>,
    pub description: Option<String>,
    pub disabled: Option<bool>,
}

const DOMAIN_COLUMNS: &str = "uuid, name, project_id, user_id, disabled, created_at, updated_at";
const SUBSCRIBER_COLUMNS: &str = "uuid, username, domain_id, email_address, rpid, description, \
     disabled, project_id, user_id, created_at, updated_at";

pub struct ProvisioningDatabase {
    conn: Mutex<Connection>,
}

impl ProvisioningDatabase {
    pub fn new(data_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join(PROVISIONING_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!(path = %db_path.display(), "opened provisioning database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::ConnectionPoisoned)
    }

    pub fn create_domain(
        &self,
        name: &str,
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<DomainRecord, StorageError> {
        let conn = self.connection()?;
        let uuid = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO domains (uuid, name, project_id, user_id, disabled, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
            "#,
            params![uuid, name, project_id, user_id, now, now],
        )
        .map_err(|err| {
            if StorageError::is_constraint_violation(&err) {
                StorageError::DomainAlreadyExists(name.to_string())
            } else {
                StorageError::DatabaseError(err)
            }
        })?;

        fetch_domain(&conn, &uuid)
    }

    pub fn get_domain(&self, uuid: &str) -> Result<DomainRecord, StorageError> {
        let conn = self.connection()?;
        fetch_domain(&conn, uuid)
    }

    pub fn list_domains(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<DomainRecord>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains \
             WHERE (?1 IS NULL OR project_id = ?1) ORDER BY name"
        ))?;

        let rows = stmt.query_map(params![project_id], domain_from_row)?;
        let mut domains = Vec::new();
        for row in rows {
            domains.push(row?);
        }
        Ok(domains)
    }

    pub fn update_domain(
        &self,
        uuid: &str,
        update: &DomainUpdate,
    ) -> Result<DomainRecord, StorageError> {
        let conn = self.connection()?;
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                r#"
                UPDATE domains SET
                    name = COALESCE(?2, name),
                    user_id = COALESCE(?3, user_id),
                    disabled = COALESCE(?4, disabled),
                    updated_at = ?5
                WHERE uuid = ?1
                "#,
                params![uuid, update.name, update.user_id, update.disabled, now],
            )
            .map_err(|err| {
                if StorageError::is_constraint_violation(&err) {
                    StorageError::DomainAlreadyExists(update.name.clone().unwrap_or_default())
                } else {
                    StorageError::DatabaseError(err)
                }
            })?;

        if changed == 0 {
            return Err(StorageError::DomainNotFound(uuid.to_string()));
        }
        fetch_domain(&conn, uuid)
    }

    pub fn delete_domain(&self, uuid: &str) -> Result<(), StorageError> {
        let conn = self.connection()?;
        let deleted = conn
            .execute("DELETE FROM domains WHERE uuid = ?1", params![uuid])
            .map_err(|err| {
                if StorageError::is_constraint_violation(&err) {
                    StorageError::DomainInUse(uuid.to_string())
                } else {
                    StorageError::DatabaseError(err)
                }
            })?;

        if deleted != 1 {
            return Err(StorageError::DomainNotFound(uuid.to_string()));
        }
        Ok(())
    }

    pub fn count_domains(&self, project_id: Option<&str>) -> Result<i64, StorageError> {
        let conn = self.connection()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM domains WHERE (?1 IS NULL OR project_id = ?1)",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn create_subscriber(
        &self,
        subscriber: &NewSubscriber,
    ) -> Result<SubscriberRecord, StorageError> {
        let conn = self.connection()?;

        // Domains of other projects are reported as missing.
        let owner: Option<Option<String>> = conn
            .query_row(
                "SELECT project_id FROM domains WHERE uuid = ?1",
                params![subscriber.domain_id],
                |row| row.get(0),
            )
            .optional()?;
        let visible = match (owner, subscriber.project_id.as_deref()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(owner), Some(project_id)) => owner.as_deref() == Some(project_id),
        };
        if !visible {
            return Err(StorageError::DomainNotFound(subscriber.domain_id.clone()));
        }

        let uuid = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO subscribers (
                uuid, username, domain_id, email_address, rpid, description,
                disabled, project_id, user_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                uuid,
                subscriber.username,
                subscriber.domain_id,
                subscriber.email_address,
                subscriber.rpid,
                subscriber.description,
                subscriber.disabled,
                subscriber.project_id,
                subscriber.user_id,
                now,
                now
            ],
        )
        .map_err(|err| {
            if StorageError::is_constraint_violation(&err) {
                StorageError::SubscriberAlreadyExists {
                    username: subscriber.username.clone(),
                    domain_id: subscriber.domain_id.clone(),
                }
            } else {
                StorageError::DatabaseError(err)
            }
        })?;

        fetch_subscriber(&conn, &uuid)
    }

    pub fn get_subscriber(&self, uuid: &str) -> Result<SubscriberRecord, StorageError> {
        let conn = self.connection()?;
        fetch_subscriber(&conn, uuid)
    }

    pub fn list_subscribers(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<SubscriberRecord>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers \
             WHERE (?1 IS NULL OR project_id = ?1) ORDER BY username"
        ))?;

        let rows = stmt.query_map(params![project_id], subscriber_from_row)?;
        let mut subscribers = Vec::new();
        for row in rows {
            subscribers.push(row?);
        }
        Ok(subscribers)
    }

    pub fn update_subscriber(
        &self,
        uuid: &str,
        update: &SubscriberUpdate,
    ) -> Result<SubscriberRecord, StorageError> {
        let conn = self.connection()?;
        let now = Utc::now().to_rfc3339();

        let changed = conn.execute(
            r#"
            UPDATE subscribers SET
                email_address = COALESCE(?2, email_address),
                rpid = COALESCE(?3, rpid),
                description = COALESCE(?4, description),
                disabled = COALESCE(?5, disabled),
                updated_at = ?6
            WHERE uuid = ?1
            "#,
            params![
                uuid,
                update.email_address,
                update.rpid,
                update.description,
                update.disabled,
                now
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::SubscriberNotFound(uuid.to_string()));
        }
        fetch_subscriber(&conn, uuid)
    }

    pub fn delete_subscriber(&self, uuid: &str) -> Result<(), StorageError> {
        let conn = self.connection()?;
        let deleted = conn.execute("DELETE FROM subscribers WHERE uuid = ?1", params![uuid])?;

        if deleted != 1 {
            return Err(StorageError::SubscriberNotFound(uuid.to_string()));
        }
        Ok(())
    }

    pub fn count_subscribers(&self, project_id: Option<&str>) -> Result<i64, StorageError> {
        let conn = self.connection()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM subscribers WHERE (?1 IS NULL OR project_id = ?1)",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Stores a hard limit for `resource` within a quota class. `-1` is
    /// persisted as `NULL`, which reads back as unlimited.
    pub fn set_quota_class_limit(
        &self,
        class_name: &str,
        resource: &str,
        hard_limit: i64,
    ) -> Result<(), StorageError> {
        self.set_quota_class_limits(class_name, &single_limit(resource, hard_limit))
    }

    /// Upserts every limit of a quota class in one transaction. Nothing is
    /// written unless all values are valid.
    pub fn set_quota_class_limits(
        &self,
        class_name: &str,
        limits: &BTreeMap<String, i64>,
    ) -> Result<(), StorageError> {
        self.upsert_limits(
            r#"
            INSERT INTO quota_classes (class_name, resource, hard_limit, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(class_name, resource) DO UPDATE SET
                hard_limit = excluded.hard_limit,
                updated_at = excluded.updated_at
            "#,
            class_name,
            limits,
        )
    }

    pub fn get_quota_class(&self, class_name: &str) -> Result<HashMap<String, i64>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT resource, hard_limit FROM quota_classes WHERE class_name = ?1",
        )?;
        let rows = stmt.query_map(params![class_name], limit_from_row)?;
        collect_limits(rows)
    }

    pub fn set_project_quota(
        &self,
        project_id: &str,
        resource: &str,
        hard_limit: i64,
    ) -> Result<(), StorageError> {
        self.set_project_quotas(project_id, &single_limit(resource, hard_limit))
    }

    /// Upserts every project override in one transaction. Nothing is
    /// written unless all values are valid.
    pub fn set_project_quotas(
        &self,
        project_id: &str,
        limits: &BTreeMap<String, i64>,
    ) -> Result<(), StorageError> {
        self.upsert_limits(
            r#"
            INSERT INTO quotas (project_id, resource, hard_limit, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(project_id, resource) DO UPDATE SET
                hard_limit = excluded.hard_limit,
                updated_at = excluded.updated_at
            "#,
            project_id,
            limits,
        )
    }

    fn upsert_limits(
        &self,
        sql: &str,
        owner: &str,
        limits: &BTreeMap<String, i64>,
    ) -> Result<(), StorageError> {
        for hard_limit in limits.values() {
            validate_hard_limit(*hard_limit)?;
        }

        let mut conn = self.connection()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(sql)?;
            for (resource, hard_limit) in limits {
                stmt.execute(params![owner, resource, stored_limit(*hard_limit), now, now])?;
            }
        }

        tx.commit()?;
        debug!(owner, written = limits.len(), "stored quota limits");
        Ok(())
    }
}

impl QuotaStore for ProvisioningDatabase {
    fn get_default_quota_class(&self) -> Result<HashMap<String, i64>, StorageError> {
        self.get_quota_class(DEFAULT_QUOTA_CLASS)
    }

    fn get_project_quotas(&self, project_id: &str) -> Result<HashMap<String, i64>, StorageError> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT resource, hard_limit FROM quotas WHERE project_id = ?1")?;
        let rows = stmt.query_map(params![project_id], limit_from_row)?;
        collect_limits(rows)
    }
}

fn fetch_domain(conn: &Connection, uuid: &str) -> Result<DomainRecord, StorageError> {
    conn.query_row(
        &format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE uuid = ?1"),
        params![uuid],
        domain_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::DomainNotFound(uuid.to_string()))
}

fn fetch_subscriber(conn: &Connection, uuid: &str) -> Result<SubscriberRecord, StorageError> {
    conn.query_row(
        &format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE uuid = ?1"),
        params![uuid],
        subscriber_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::SubscriberNotFound(uuid.to_string()))
}

fn domain_from_row(row: &Row<'_>) -> rusqlite::Result<DomainRecord> {
    Ok(DomainRecord {
        uuid: row.get(0)?,
        name: row.get(1)?,
        project_id: row.get(2)?,
        user_id: row.get(3)?,
        disabled: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn subscriber_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriberRecord> {
    Ok(SubscriberRecord {
        uuid: row.get(0)?,
        username: row.get(1)?,
        domain_id: row.get(2)?,
        email_address: row.get(3)?,
        rpid: row.get(4)?,
        description: row.get(5)?,
        disabled: row.get(6)?,
        project_id: row.get(7)?,
        user_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn limit_from_row(row: &Row<'_>) -> rusqlite::Result<(String, i64)> {
    let resource: String = row.get(0)?;
    let hard_limit: Option<i64> = row.get(1)?;
    Ok((resource, hard_limit.unwrap_or(UNLIMITED)))
}

fn collect_limits<I>(rows: I) -> Result<HashMap<String, i64>, StorageError>
where
    I: Iterator<Item = rusqlite::Result<(String, i64)>>,
{
    let mut limits = HashMap::new();
    for row in rows {
        let (resource, hard_limit) = row?;
        limits.insert(resource, hard_limit);
    }
    Ok(limits)
}

fn validate_hard_limit(hard_limit: i64) -> Result<(), StorageError> {
    if hard_limit < UNLIMITED {
        return Err(StorageError::InvalidQuotaValue(format!(
            "hard limit must be -1 or greater, got {hard_limit}"
        )));
    }
    Ok(())
}

fn single_limit(resource: &str, hard_limit: i64) -> BTreeMap<String, i64> {
    BTreeMap::from([(resource.to_string(), hard_limit)])
}

fn stored_limit(hard_limit: i64) -> Option<i64> {
    (hard_limit >= 0).then_some(hard_limit)
}
