//! SQLite-backed record store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use confetti_core::{
    BirthDate, BirthdayRecord, BirthdayStore, Contribution, ContributionKind, NewContribution,
    NotificationClaim, StoreError,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;

        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), "birthday database initialized");
        Ok(store)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS birthdays (
                user_id TEXT PRIMARY KEY,
                birth_date TEXT NOT NULL,
                last_notification_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_birth_date ON birthdays(birth_date);

            CREATE TABLE IF NOT EXISTS contributions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                celebrant_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                body TEXT NOT NULL,
                media_url TEXT,
                sent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contributions_celebrant
                ON contributions(celebrant_id, kind, sent);
            ",
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection mutex poisoned".to_string()))
    }
}

fn parse_timestamp(id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

fn parse_date(id: &str, value: &str) -> Result<NaiveDate, StoreError> {
    // Older rows may carry a full `YYYY-MM-DD HH:MM:SS` timestamp.
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("bad date '{}': {}", value, e),
    })
}

fn parse_kind(id: &str, value: &str) -> Result<ContributionKind, StoreError> {
    match value {
        "message" => Ok(ContributionKind::Message),
        "description" => Ok(ContributionKind::Description),
        other => Err(StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("unknown contribution kind '{}'", other),
        }),
    }
}

/// Raw birthday row, decoded after the statement finishes.
struct BirthdayRow {
    user_id: String,
    birth_date: String,
    last_notification_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl BirthdayRow {
    const COLUMNS: &'static str =
        "user_id, birth_date, last_notification_date, created_at, updated_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            birth_date: row.get(1)?,
            last_notification_date: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<BirthdayRecord, StoreError> {
        let birth_date: BirthDate =
            self.birth_date
                .parse()
                .map_err(|e: confetti_core::BirthDateError| StoreError::Corrupt {
                    id: self.user_id.clone(),
                    reason: e.to_string(),
                })?;
        let last_notification_date = self
            .last_notification_date
            .as_deref()
            .map(|d| parse_date(&self.user_id, d))
            .transpose()?;
        Ok(BirthdayRecord {
            birth_date,
            last_notification_date,
            created_at: parse_timestamp(&self.user_id, &self.created_at)?,
            updated_at: parse_timestamp(&self.user_id, &self.updated_at)?,
            person_id: self.user_id,
        })
    }
}

/// Raw contribution row.
struct ContributionRow {
    id: i64,
    kind: String,
    celebrant_id: String,
    sender_id: String,
    sender_name: String,
    body: String,
    media_url: Option<String>,
    sent: bool,
    created_at: String,
}

impl ContributionRow {
    const COLUMNS: &'static str =
        "id, kind, celebrant_id, sender_id, sender_name, body, media_url, sent, created_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            celebrant_id: row.get(2)?,
            sender_id: row.get(3)?,
            sender_name: row.get(4)?,
            body: row.get(5)?,
            media_url: row.get(6)?,
            sent: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<Contribution, StoreError> {
        let id = self.id.to_string();
        Ok(Contribution {
            id: self.id,
            kind: parse_kind(&id, &self.kind)?,
            celebrant_id: self.celebrant_id,
            sender_id: self.sender_id,
            sender_display_name: self.sender_name,
            body: self.body,
            media_url: self.media_url,
            sent: self.sent,
            created_at: parse_timestamp(&id, &self.created_at)?,
        })
    }
}

fn select_birthday(conn: &Connection, person_id: &str) -> Result<Option<BirthdayRow>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM birthdays WHERE user_id = ?1",
            BirthdayRow::COLUMNS
        ),
        params![person_id],
        BirthdayRow::from_row,
    )
    .optional()
    .map_err(db_err)
}

#[async_trait]
impl BirthdayStore for SqliteStore {
    async fn get_birthday(&self, person_id: &str) -> Result<Option<BirthdayRecord>, StoreError> {
        let row = {
            let conn = self.conn()?;
            select_birthday(&conn, person_id)?
        };
        row.map(BirthdayRow::decode).transpose()
    }

    async fn upsert_birthday(
        &self,
        person_id: &str,
        birth_date: BirthDate,
    ) -> Result<BirthdayRecord, StoreError> {
        let now = Utc::now().to_rfc3339();
        let row = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO birthdays (user_id, birth_date, last_notification_date, created_at, updated_at)
                 VALUES (?1, ?2, NULL, ?3, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     birth_date = excluded.birth_date,
                     last_notification_date = NULL,
                     updated_at = excluded.updated_at",
                params![person_id, birth_date.to_string(), now],
            )
            .map_err(db_err)?;
            select_birthday(&conn, person_id)?
        };
        debug!(person = %person_id, %birth_date, "birthday saved");
        row.ok_or_else(|| StoreError::Backend(format!("birthday {} vanished after upsert", person_id)))?
            .decode()
    }

    async fn ensure_placeholder(&self, person_id: &str) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO birthdays (user_id, birth_date, last_notification_date, created_at, updated_at)
                 VALUES (?1, ?2, NULL, ?3, ?3)",
                params![person_id, BirthDate::Unknown.to_string(), now],
            )
            .map_err(db_err)?;
        Ok(inserted == 1)
    }

    async fn list_birthdays(&self) -> Result<Vec<BirthdayRecord>, StoreError> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM birthdays ORDER BY user_id",
                    BirthdayRow::COLUMNS
                ))
                .map_err(db_err)?;
            stmt.query_map([], BirthdayRow::from_row)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?
        };
        rows.into_iter().map(BirthdayRow::decode).collect()
    }

    async fn claim_notification(
        &self,
        person_id: &str,
        date: NaiveDate,
    ) -> Result<NotificationClaim, StoreError> {
        let date_text = date.format(DATE_FORMAT).to_string();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        let previous: Option<Option<String>> = tx
            .query_row(
                "SELECT last_notification_date FROM birthdays WHERE user_id = ?1",
                params![person_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let Some(previous) = previous else {
            return Ok(NotificationClaim::UnknownPerson);
        };

        let changed = tx
            .execute(
                "UPDATE birthdays SET last_notification_date = ?2, updated_at = ?3
                 WHERE user_id = ?1
                   AND (last_notification_date IS NULL OR substr(last_notification_date, 1, 10) != ?2)",
                params![person_id, date_text, now],
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        if changed == 0 {
            return Ok(NotificationClaim::AlreadyClaimed);
        }
        let previous = previous
            .as_deref()
            .map(|d| parse_date(person_id, d))
            .transpose()?;
        Ok(NotificationClaim::Acquired { previous })
    }

    async fn set_last_notification(
        &self,
        person_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE birthdays SET last_notification_date = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![
                person_id,
                date.map(|d| d.format(DATE_FORMAT).to_string()),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_contribution(
        &self,
        contribution: NewContribution,
    ) -> Result<Contribution, StoreError> {
        let created_at = Utc::now();
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO contributions (kind, celebrant_id, sender_id, sender_name, body, media_url, sent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                params![
                    contribution.kind.as_str(),
                    contribution.celebrant_id,
                    contribution.sender_id,
                    contribution.sender_display_name,
                    contribution.body,
                    contribution.media_url,
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            conn.last_insert_rowid()
        };

        Ok(Contribution {
            id,
            kind: contribution.kind,
            celebrant_id: contribution.celebrant_id,
            sender_id: contribution.sender_id,
            sender_display_name: contribution.sender_display_name,
            body: contribution.body,
            media_url: contribution.media_url,
            sent: false,
            created_at,
        })
    }

    async fn unsent_contributions(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
    ) -> Result<Vec<Contribution>, StoreError> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM contributions
                     WHERE celebrant_id = ?1 AND kind = ?2 AND sent = 0
                     ORDER BY created_at ASC, id ASC",
                    ContributionRow::COLUMNS
                ))
                .map_err(db_err)?;
            stmt.query_map(params![celebrant_id, kind.as_str()], ContributionRow::from_row)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?
        };
        rows.into_iter().map(ContributionRow::decode).collect()
    }

    async fn count_unsent(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
    ) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM contributions WHERE celebrant_id = ?1 AND kind = ?2 AND sent = 0",
                params![celebrant_id, kind.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    async fn mark_sent(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
        ids: &[i64],
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        let mut changed = 0;
        {
            let mut stmt = tx
                .prepare(
                    "UPDATE contributions SET sent = 1
                     WHERE id = ?1 AND celebrant_id = ?2 AND kind = ?3 AND sent = 0",
                )
                .map_err(db_err)?;
            for id in ids {
                changed += stmt
                    .execute(params![id, celebrant_id, kind.as_str()])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        debug!(celebrant = %celebrant_id, %kind, changed, "contributions marked sent");
        Ok(changed)
    }
}
