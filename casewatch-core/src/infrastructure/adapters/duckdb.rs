// casewatch-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use duckdb::{Config, Connection, InterruptHandle, params};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

// Hexagonal imports
use crate::domain::record::{CaseRecord, QualityFlag};
use crate::error::PipelineError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::store::{CaseStore, UpsertCounts};

const SELECT_COLUMNS: &str = "region_code, CAST(date AS VARCHAR), confirmed_cases, deaths, population, \
     incidence_per_100k, new_cases, new_deaths, new_cases_avg_7d, quality_flags";

pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    table: String,
}

impl DuckDbStore {
    /// Open (or create) the database file and make sure the table exists.
    ///
    /// `table` must already be a plain identifier (the config validator checks it).
    pub fn open(db_path: &Path, table: &str) -> Result<Self, InfrastructureError> {
        let config = Config::default();
        let conn = if db_path.as_os_str() == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            if let Some(parent) = db_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(db_path, config)?
        };
        Self::with_connection(conn, table)
    }

    pub fn in_memory(table: &str) -> Result<Self, InfrastructureError> {
        Self::open(Path::new(":memory:"), table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, InfrastructureError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                region_code VARCHAR NOT NULL,
                date DATE NOT NULL,
                confirmed_cases BIGINT NOT NULL,
                deaths BIGINT NOT NULL,
                population BIGINT,
                incidence_per_100k DOUBLE,
                new_cases BIGINT,
                new_deaths BIGINT,
                new_cases_avg_7d DOUBLE,
                quality_flags VARCHAR NOT NULL DEFAULT '',
                updated_at TIMESTAMP NOT NULL DEFAULT current_timestamp,
                PRIMARY KEY (region_code, date)
            );"
        ))?;

        Ok(Self {
            interrupt: conn.interrupt_handle(),
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, InfrastructureError> {
    conn.lock()
        .map_err(|_| InfrastructureError::Database(DatabaseError::Poisoned))
}

fn upsert_sql(table: &str) -> String {
    format!(
        "INSERT INTO \"{table}\" (region_code, date, confirmed_cases, deaths, population,
             incidence_per_100k, new_cases, new_deaths, new_cases_avg_7d, quality_flags, updated_at)
         VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, current_timestamp)
         ON CONFLICT (region_code, date) DO UPDATE SET
             confirmed_cases = EXCLUDED.confirmed_cases,
             deaths = EXCLUDED.deaths,
             population = EXCLUDED.population,
             incidence_per_100k = EXCLUDED.incidence_per_100k,
             new_cases = EXCLUDED.new_cases,
             new_deaths = EXCLUDED.new_deaths,
             new_cases_avg_7d = EXCLUDED.new_cases_avg_7d,
             quality_flags = EXCLUDED.quality_flags,
             updated_at = EXCLUDED.updated_at"
    )
}

/// Dropped while armed: flags the blocking upsert and interrupts its statement.
struct AbandonOnDrop {
    abandoned: Arc<AtomicBool>,
    interrupt: Arc<InterruptHandle>,
    armed: bool,
}

impl AbandonOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.abandoned.store(true, Ordering::SeqCst);
            self.interrupt.interrupt();
            warn!("Upsert abandoned before completion, rolling back");
        }
    }
}

fn check_abandoned(abandoned: &AtomicBool) -> Result<(), InfrastructureError> {
    if abandoned.load(Ordering::SeqCst) {
        return Err(InfrastructureError::Database(DatabaseError::Abandoned));
    }
    Ok(())
}

/// One transaction per batch: either every row lands or none does.
///
/// `abandoned` is polled between rows and right before the commit; an early
/// return drops the transaction, which rolls it back.
fn upsert_blocking(
    conn: &Mutex<Connection>,
    table: &str,
    records: &[CaseRecord],
    abandoned: &AtomicBool,
) -> Result<UpsertCounts, InfrastructureError> {
    let mut guard = lock(conn)?;
    let tx = guard.transaction()?;

    // Keys present before this run decide inserted vs updated.
    let existing: HashSet<(String, String)> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT region_code, CAST(date AS VARCHAR) FROM \"{table}\""
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<_, _>>()?
    };

    let mut counts = UpsertCounts::default();
    {
        let mut stmt = tx.prepare(&upsert_sql(table))?;
        for r in records {
            check_abandoned(abandoned)?;
            let date = r.date.format("%Y-%m-%d").to_string();
            stmt.execute(params![
                r.region_code,
                date,
                r.confirmed_cases,
                r.deaths,
                r.population,
                r.incidence_per_100k,
                r.new_cases,
                r.new_deaths,
                r.new_cases_avg_7d,
                QualityFlag::join(&r.quality_flags),
            ])?;

            if existing.contains(&(r.region_code.clone(), date)) {
                counts.updated += 1;
            } else {
                counts.inserted += 1;
            }
        }
    }

    check_abandoned(abandoned)?;
    tx.commit()?;
    Ok(counts)
}

type StoredRow = (
    String,
    String,
    i64,
    i64,
    Option<i64>,
    Option<f64>,
    Option<i64>,
    Option<i64>,
    Option<f64>,
    String,
);

fn load_blocking(
    conn: &Mutex<Connection>,
    table: &str,
    region: Option<&str>,
) -> Result<Vec<CaseRecord>, PipelineError> {
    let guard = lock(conn)?;

    let map_row = |row: &duckdb::Row<'_>| -> duckdb::Result<StoredRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
        ))
    };

    let rows: Vec<StoredRow> = match region {
        Some(code) => {
            let mut stmt = guard.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM \"{table}\" WHERE region_code = ? ORDER BY region_code, date"
            ))?;
            let mapped = stmt.query_map(params![code], map_row)?;
            mapped.collect::<Result<_, _>>()?
        }
        None => {
            let mut stmt = guard.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM \"{table}\" ORDER BY region_code, date"
            ))?;
            let mapped = stmt.query_map([], map_row)?;
            mapped.collect::<Result<_, _>>()?
        }
    };

    rows.into_iter().map(into_record).collect()
}

fn into_record(row: StoredRow) -> Result<CaseRecord, PipelineError> {
    let (region_code, date, confirmed_cases, deaths, population, incidence, new_cases, new_deaths, avg, flags) =
        row;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| PipelineError::InternalError(format!("Stored date '{}': {}", date, e)))?;
    let quality_flags = QualityFlag::split(&flags).map_err(PipelineError::InternalError)?;

    Ok(CaseRecord {
        region_code,
        date,
        confirmed_cases,
        deaths,
        population,
        incidence_per_100k: incidence,
        new_cases,
        new_deaths,
        new_cases_avg_7d: avg,
        quality_flags,
    })
}

fn join_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::InternalError(format!("Store task failed: {}", e))
}

#[async_trait]
impl CaseStore for DuckDbStore {
    async fn upsert_records(&self, records: &[CaseRecord]) -> Result<UpsertCounts, PipelineError> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        let batch = records.to_vec();
        debug!(rows = batch.len(), table = %table, "Upserting batch");

        let abandoned = Arc::new(AtomicBool::new(false));
        let guard = AbandonOnDrop {
            abandoned: Arc::clone(&abandoned),
            interrupt: Arc::clone(&self.interrupt),
            armed: true,
        };
        let joined =
            tokio::task::spawn_blocking(move || upsert_blocking(&conn, &table, &batch, &abandoned))
                .await;
        guard.disarm();
        let counts = joined.map_err(join_error)??;

        info!(
            inserted = counts.inserted,
            updated = counts.updated,
            table = %self.table,
            "Store upsert committed"
        );
        Ok(counts)
    }

    async fn count_rows(&self) -> Result<u64, PipelineError> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || -> Result<u64, PipelineError> {
            let guard = lock(&conn)?;
            let count: i64 =
                guard.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
        .map_err(join_error)?
    }

    async fn load_records(&self, region: Option<&str>) -> Result<Vec<CaseRecord>, PipelineError> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        let region = region.map(str::to_string);
        tokio::task::spawn_blocking(move || load_blocking(&conn, &table, region.as_deref()))
            .await
            .map_err(join_error)?
    }

    fn engine_name(&self) -> &str {
        "duckdb"
    }
}
