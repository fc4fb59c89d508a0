//! Prediction ledger
//!
//! Durable store of every scored observation, backed by SQLite. The
//! `observation_id` column is the table's primary key, so uniqueness is
//! decided by the storage engine: when two writers race on the same id,
//! whether in this process or another one sharing the database file, exactly
//! one insert commits and the other gets [`LedgerError::DuplicateKey`].
//!
//! Writes run with `synchronous = FULL`, so a successful `record` has reached
//! disk before it returns. The predicted class is stored as given; the
//! ledger never re-derives a decision from the probability.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::LedgerError;

/// Default busy timeout while another process holds the write lock
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS predictions (
    observation_id INTEGER PRIMARY KEY,
    observation    TEXT    NOT NULL,
    proba          REAL    NOT NULL CHECK (proba >= 0.0 AND proba <= 1.0),
    predicted_class INTEGER NOT NULL CHECK (predicted_class IN (0, 1)),
    true_class     INTEGER NULL CHECK (true_class IN (0, 1)),
    created_at     TEXT    NOT NULL,
    updated_at     TEXT    NOT NULL
)";

/// One stored scoring decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub observation_id: i64,
    /// Raw request payload as received, serialized JSON
    pub observation: String,
    pub proba: f64,
    /// Decision made when the observation was scored
    pub predicted_class: bool,
    pub true_class: Option<u8>,
    pub created_at: String,
    pub updated_at: String,
}

/// Connection settings for [`PredictionLedger::open`]
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl LedgerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

/// SQLite-backed prediction ledger
pub struct PredictionLedger {
    conn: Mutex<Connection>,
}

impl PredictionLedger {
    /// Open (creating if needed) the ledger database at `config.path`
    pub fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")?;
        let ledger = Self::init(conn)?;
        tracing::info!(path = %config.path.display(), "Prediction ledger opened");
        Ok(ledger)
    }

    /// Private in-memory ledger, mostly useful in tests
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new record; fails with `DuplicateKey` if the id exists
    #[tracing::instrument(level = "debug", skip(self, raw_payload))]
    pub fn record(
        &self,
        observation_id: i64,
        raw_payload: &str,
        probability: f64,
        predicted_class: bool,
    ) -> Result<(), LedgerError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(LedgerError::InvalidValue {
                field: "proba",
                value: probability.to_string(),
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let result = conn.execute(
            "INSERT INTO predictions
                 (observation_id, observation, proba, predicted_class, true_class, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)",
            params![observation_id, raw_payload, probability, predicted_class, now],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Err(LedgerError::DuplicateKey { observation_id })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Set `true_class` on an existing record and return the updated record
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn apply_label(
        &self,
        observation_id: i64,
        true_class: u8,
    ) -> Result<PredictionRecord, LedgerError> {
        if true_class > 1 {
            return Err(LedgerError::InvalidValue {
                field: "true_class",
                value: true_class.to_string(),
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE predictions SET true_class = ?2, updated_at = ?3 WHERE observation_id = ?1",
            params![observation_id, true_class, now],
        )?;
        if updated == 0 {
            return Err(LedgerError::NotFound { observation_id });
        }

        let record = fetch(&tx, observation_id)?
            .ok_or(LedgerError::NotFound { observation_id })?;
        tx.commit()?;
        Ok(record)
    }

    /// Look up a record by observation id
    pub fn get(&self, observation_id: i64) -> Result<PredictionRecord, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        fetch(&conn, observation_id)?
            .ok_or(LedgerError::NotFound { observation_id })
    }

    /// Number of stored records
    pub fn count(&self) -> Result<u64, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn fetch(
    conn: &Connection,
    observation_id: i64,
) -> Result<Option<PredictionRecord>, rusqlite::Error> {
    conn.query_row(
        "SELECT observation_id, observation, proba, predicted_class, true_class, created_at, updated_at
         FROM predictions WHERE observation_id = ?1",
        params![observation_id],
        |row| {
            Ok(PredictionRecord {
                observation_id: row.get(0)?,
                observation: row.get(1)?,
                proba: row.get(2)?,
                predicted_class: row.get(3)?,
                true_class: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        },
    )
    .optional()
}
