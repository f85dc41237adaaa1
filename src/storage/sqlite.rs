use crate::model::{Card, CardPriceState, HistoryEntry, Rarity, Snapshot, StorageError};
use crate::utils::parse_datetime;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Append-only history log and snapshot archive.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Opens the database and creates the schema.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS history_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL,
                card_key TEXT NOT NULL,
                name TEXT NOT NULL,
                number TEXT NOT NULL DEFAULT '',
                set_name TEXT NOT NULL DEFAULT '',
                rarity TEXT NOT NULL DEFAULT 'unknown',
                raw_price REAL NOT NULL,
                psa10_price REAL NOT NULL,
                delta_usd REAL NOT NULL,
                score REAL NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                release_date TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_card ON history_entries (card_key);

            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                taken_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshot_cards (
                snapshot_id INTEGER NOT NULL REFERENCES snapshots(id),
                card_key TEXT NOT NULL,
                state_json TEXT NOT NULL,
                PRIMARY KEY (snapshot_id, card_key)
            );
            ",
        )?;

        Ok(Self { conn })
    }

    /// Appends entries to the history log in one transaction.
    pub fn append_entries(&self, entries: &[HistoryEntry]) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO history_entries (
                    recorded_at, card_key, name, number, set_name, rarity, release_date,
                    raw_price, psa10_price, delta_usd, score, notes
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.timestamp.to_rfc3339(),
                    entry.card.key().as_str(),
                    &entry.card.name,
                    &entry.card.number,
                    &entry.card.set_name,
                    entry.card.rarity.as_str(),
                    &entry.card.release_date,
                    entry.raw_price,
                    entry.psa10_price,
                    entry.delta_usd,
                    entry.score,
                    &entry.notes,
                ])?;
            }
        }
        tx.commit()?;
        info!("Appended {} history entries", entries.len());
        Ok(entries.len())
    }

    /// Loads the whole history log in insertion order. Malformed rows are skipped.
    pub fn load_entries(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT recorded_at, name, number, set_name, rarity, release_date,
                    raw_price, psa10_price, delta_usd, score, notes
             FROM history_entries ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], Self::map_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            match row {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping malformed history row: {}", e),
            }
        }
        Ok(entries)
    }

    /// Stores a snapshot and returns its id.
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<i64, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO snapshots (taken_at) VALUES (?1)",
            params![snapshot.timestamp.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO snapshot_cards (snapshot_id, card_key, state_json) VALUES (?1, ?2, ?3)",
            )?;
            for (key, state) in &snapshot.cards {
                stmt.execute(params![id, key.as_str(), serde_json::to_string(state)?])?;
            }
        }
        tx.commit()?;
        info!("Saved snapshot {} with {} cards", id, snapshot.cards.len());
        Ok(id)
    }

    /// All snapshots, oldest first.
    pub fn load_snapshots(&self) -> Result<Vec<Snapshot>, StorageError> {
        self.load_snapshots_limited(None)
    }

    /// The `count` most recent snapshots, oldest first.
    pub fn latest_snapshots(&self, count: usize) -> Result<Vec<Snapshot>, StorageError> {
        self.load_snapshots_limited(Some(count))
    }

    fn load_snapshots_limited(&self, limit: Option<usize>) -> Result<Vec<Snapshot>, StorageError> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self
            .conn
            .prepare("SELECT id, taken_at FROM snapshots ORDER BY taken_at DESC, id DESC LIMIT ?1")?;
        let headers: Vec<(i64, String)> = stmt
            .query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        let mut card_stmt = self
            .conn
            .prepare("SELECT card_key, state_json FROM snapshot_cards WHERE snapshot_id = ?1")?;

        let mut snapshots = Vec::with_capacity(headers.len());
        for (id, taken_at) in headers.into_iter().rev() {
            let mut cards = BTreeMap::new();
            let rows = card_stmt.query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (key, json) = row?;
                match serde_json::from_str::<CardPriceState>(&json) {
                    Ok(state) => {
                        cards.insert(state.card.key(), state);
                    }
                    Err(e) => warn!("Skipping card {} in snapshot {}: {}", key, id, e),
                }
            }
            snapshots.push(Snapshot {
                timestamp: timestamp_or_now(&taken_at),
                cards,
            });
        }
        Ok(snapshots)
    }

    fn map_entry(row: &Row) -> Result<HistoryEntry, rusqlite::Error> {
        let recorded_at: String = row.get(0)?;
        let rarity: String = row.get(4)?;
        Ok(HistoryEntry {
            timestamp: timestamp_or_now(&recorded_at),
            card: Card {
                name: row.get(1)?,
                number: row.get(2)?,
                set_name: row.get(3)?,
                rarity: Rarity::parse(&rarity),
                release_date: row.get(5)?,
            },
            raw_price: row.get(6)?,
            psa10_price: row.get(7)?,
            delta_usd: row.get(8)?,
            score: row.get(9)?,
            notes: row.get(10)?,
        })
    }
}

/// Unparseable stored timestamps fall back to the current time.
fn timestamp_or_now(text: &str) -> DateTime<Utc> {
    parse_datetime(text).unwrap_or_else(|| {
        warn!("Invalid stored timestamp '{}', using now", text);
        Utc::now()
    })
}
