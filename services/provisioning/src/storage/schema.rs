use rusqlite::Connection;

use super::error::StorageError;

pub const DOMAINS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE,
    project_id TEXT,
    user_id TEXT,
    disabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub const SUBSCRIBERS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS subscribers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    domain_id TEXT NOT NULL REFERENCES domains(uuid),
    email_address TEXT NOT NULL DEFAULT '',
    rpid TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    disabled INTEGER NOT NULL DEFAULT 0,
    project_id TEXT,
    user_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(username, domain_id)
);
"#;

pub const QUOTAS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS quotas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    resource TEXT NOT NULL,
    hard_limit INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_id, resource)
);
"#;

pub const QUOTA_CLASSES_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS quota_classes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_name TEXT NOT NULL,
    resource TEXT NOT NULL,
    hard_limit INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(class_name, resource)
);
"#;

pub const PROVISIONING_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_domains_project ON domains(project_id);
CREATE INDEX IF NOT EXISTS idx_subscribers_project ON subscribers(project_id);
"#;

pub fn init_database(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(DOMAINS_TABLE_SCHEMA)?;
    conn.execute_batch(SUBSCRIBERS_TABLE_SCHEMA)?;
    conn.execute_batch(QUOTAS_TABLE_SCHEMA)?;
    conn.execute_batch(QUOTA_CLASSES_TABLE_SCHEMA)?;
    conn.execute_batch(PROVISIONING_INDEXES)?;
    Ok(())
}
