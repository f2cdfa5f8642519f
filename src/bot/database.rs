//! Persistent SQLite storage for per-chat and per-user records.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::bot::message::Sender;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt thread data: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Per-user flags inside one chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMember {
    #[serde(default)]
    pub gc_ban: bool,
}

/// Per-chat record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadRecord {
    pub chat_id: i64,
    pub members: HashMap<i64, ThreadMember>,
}

impl ThreadRecord {
    pub fn new(chat_id: i64) -> Self {
        Self { chat_id, members: HashMap::new() }
    }

    pub fn is_group_banned(&self, user_id: i64) -> bool {
        self.members.get(&user_id).is_some_and(|m| m.gc_ban)
    }

    pub fn set_group_ban(&mut self, user_id: i64, banned: bool) {
        self.members.entry(user_id).or_default().gc_ban = banned;
    }
}

/// Per-user record with a profile snapshot taken when it was first created.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    /// Banned from using the bot anywhere.
    pub banned: bool,
}

impl UserRecord {
    pub fn from_sender(sender: &Sender) -> Self {
        Self {
            user_id: sender.id,
            username: sender.username.clone(),
            first_name: sender.first_name.clone(),
            last_name: sender.last_name.clone(),
            banned: false,
        }
    }
}

/// Storage used by the dispatch pipeline and by commands that mutate records.
///
/// The `load_or_create_*` calls persist the record before returning it.
pub trait RecordStore: Send + Sync {
    fn load_or_create_thread(&self, chat_id: i64) -> Result<ThreadRecord, DatabaseError>;
    fn load_or_create_user(&self, sender: &Sender) -> Result<UserRecord, DatabaseError>;
    fn save_thread(&self, thread: &ThreadRecord) -> Result<(), DatabaseError>;
    fn save_user(&self, user: &UserRecord) -> Result<(), DatabaseError>;
}

/// SQLite-backed [`RecordStore`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let db = Self { conn: Mutex::new(Connection::open(path)?) };
        db.init_schema()?;

        let (threads, users) = db.get_counts()?;
        info!("Loaded database from {:?} ({} threads, {} users)", path, threads, users);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let db = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn().execute_batch(r#"
            CREATE TABLE IF NOT EXISTS threads (
                chat_id INTEGER PRIMARY KEY,
                data TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT NOT NULL,
                last_name TEXT,
                banned INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
        "#)?;
        Ok(())
    }

    fn get_counts(&self) -> Result<(usize, usize), DatabaseError> {
        let conn = self.conn();
        let threads: i64 = conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok((threads as usize, users as usize))
    }

    fn find_thread(conn: &Connection, chat_id: i64) -> Result<Option<ThreadRecord>, DatabaseError> {
        let data: Option<String> = conn
            .query_row("SELECT data FROM threads WHERE chat_id = ?1", params![chat_id], |row| row.get(0))
            .optional()?;

        let Some(data) = data else {
            return Ok(None);
        };
        let members: HashMap<i64, ThreadMember> = serde_json::from_str(&data)?;
        Ok(Some(ThreadRecord { chat_id, members }))
    }

    fn find_user(conn: &Connection, user_id: i64) -> Result<Option<UserRecord>, DatabaseError> {
        let user = conn
            .query_row(
                "SELECT user_id, username, first_name, last_name, banned FROM users WHERE user_id = ?1",
                params![user_id],
                |row| Ok(UserRecord {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    first_name: row.get(2)?,
                    last_name: row.get(3)?,
                    banned: row.get(4)?,
                }),
            )
            .optional()?;
        Ok(user)
    }
}

impl RecordStore for Database {
    // Insert-if-missing then read, under one lock. Existing rows are never
    // written here, so a concurrent save cannot be overwritten.
    fn load_or_create_thread(&self, chat_id: i64) -> Result<ThreadRecord, DatabaseError> {
        let conn = self.conn();
        let created = conn.execute(
            "INSERT INTO threads (chat_id) VALUES (?1) ON CONFLICT(chat_id) DO NOTHING",
            params![chat_id],
        )?;
        if created > 0 {
            debug!("Created thread record for chat {}", chat_id);
        }
        Ok(Self::find_thread(&conn, chat_id)?.unwrap_or_else(|| ThreadRecord::new(chat_id)))
    }

    fn load_or_create_user(&self, sender: &Sender) -> Result<UserRecord, DatabaseError> {
        let conn = self.conn();
        let created = conn.execute(
            "INSERT INTO users (user_id, username, first_name, last_name) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO NOTHING",
            params![sender.id, sender.username, sender.first_name, sender.last_name],
        )?;
        if created > 0 {
            debug!("Created user record for {}", sender.id);
        }
        Ok(Self::find_user(&conn, sender.id)?.unwrap_or_else(|| UserRecord::from_sender(sender)))
    }

    fn save_thread(&self, thread: &ThreadRecord) -> Result<(), DatabaseError> {
        let data = serde_json::to_string(&thread.members)?;
        self.conn().execute(
            "INSERT INTO threads (chat_id, data) VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET data = ?2",
            params![thread.chat_id, data],
        )?;
        Ok(())
    }

    fn save_user(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO users (user_id, username, first_name, last_name, banned)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                username = ?2,
                first_name = ?3,
                last_name = ?4,
                banned = ?5",
            params![user.user_id, user.username, user.first_name, user.last_name, user.banned],
        )?;
        Ok(())
    }
}
