//! Postgres store and alert ledger.
//!
//! A cycle's rows are upserted inside one transaction with
//! `INSERT ... ON CONFLICT (trans_num) DO UPDATE`. A `content_hash` column
//! lets an unchanged replay keep its original `scored_at`.

use super::{check_row, DailyReport, ScoredPaymentStore};
use crate::alerts::AlertLedger;
use crate::core::{PaymentSnapshot, ScoredPayment};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const CREATE_SCORED: &str = r"
CREATE TABLE IF NOT EXISTS payments_scored (
    trans_num          TEXT PRIMARY KEY,
    event_time         BIGINT NOT NULL,
    cc_num             TEXT,
    merchant           TEXT,
    category           TEXT,
    amt                DOUBLE PRECISION NOT NULL,
    first              TEXT,
    last               TEXT,
    gender             TEXT,
    street             TEXT,
    city               TEXT,
    state              TEXT,
    zip                BIGINT,
    lat                DOUBLE PRECISION,
    long               DOUBLE PRECISION,
    city_pop           BIGINT,
    job                TEXT,
    dob                TEXT,
    merch_lat          DOUBLE PRECISION,
    merch_long         DOUBLE PRECISION,
    fraud_probability  DOUBLE PRECISION NOT NULL,
    fraud_flag         BOOLEAN NOT NULL,
    model_version      TEXT NOT NULL,
    scored_at          TIMESTAMPTZ NOT NULL,
    content_hash       TEXT NOT NULL
)";

const CREATE_LEDGER: &str = r"
CREATE TABLE IF NOT EXISTS alert_ledger (
    trans_num   TEXT PRIMARY KEY,
    alerted_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const UPSERT: &str = r"
INSERT INTO payments_scored (
    trans_num, event_time, cc_num, merchant, category, amt, first, last, gender,
    street, city, state, zip, lat, long, city_pop, job, dob, merch_lat, merch_long,
    fraud_probability, fraud_flag, model_version, scored_at, content_hash
) VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9,
    $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
    $21, $22, $23, $24, $25
)
ON CONFLICT (trans_num) DO UPDATE SET
    event_time = EXCLUDED.event_time,
    cc_num = EXCLUDED.cc_num,
    merchant = EXCLUDED.merchant,
    category = EXCLUDED.category,
    amt = EXCLUDED.amt,
    first = EXCLUDED.first,
    last = EXCLUDED.last,
    gender = EXCLUDED.gender,
    street = EXCLUDED.street,
    city = EXCLUDED.city,
    state = EXCLUDED.state,
    zip = EXCLUDED.zip,
    lat = EXCLUDED.lat,
    long = EXCLUDED.long,
    city_pop = EXCLUDED.city_pop,
    job = EXCLUDED.job,
    dob = EXCLUDED.dob,
    merch_lat = EXCLUDED.merch_lat,
    merch_long = EXCLUDED.merch_long,
    fraud_probability = EXCLUDED.fraud_probability,
    fraud_flag = EXCLUDED.fraud_flag,
    model_version = EXCLUDED.model_version,
    scored_at = CASE
        WHEN payments_scored.content_hash = EXCLUDED.content_hash THEN payments_scored.scored_at
        ELSE EXCLUDED.scored_at
    END,
    content_hash = EXCLUDED.content_hash
";

const SELECT_COLUMNS: &str = r"
    trans_num, event_time, cc_num, merchant, category, amt, first, last, gender,
    street, city, state, zip, lat, long, city_pop, job, dob, merch_lat, merch_long,
    fraud_probability, fraud_flag, model_version, scored_at
";

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::StoreUnavailable(e.to_string())
}

fn row_to_payment(r: &PgRow) -> Result<ScoredPayment, sqlx::Error> {
    Ok(ScoredPayment {
        trans_num: r.try_get("trans_num")?,
        fraud_probability: r.try_get("fraud_probability")?,
        fraud_flag: r.try_get("fraud_flag")?,
        model_version: r.try_get("model_version")?,
        scored_at: r.try_get::<DateTime<Utc>, _>("scored_at")?,
        snapshot: PaymentSnapshot {
            event_time: r.try_get("event_time")?,
            cc_num: r.try_get("cc_num")?,
            merchant: r.try_get("merchant")?,
            category: r.try_get("category")?,
            amt: r.try_get("amt")?,
            first: r.try_get("first")?,
            last: r.try_get("last")?,
            gender: r.try_get("gender")?,
            street: r.try_get("street")?,
            city: r.try_get("city")?,
            state: r.try_get("state")?,
            zip: r.try_get("zip")?,
            lat: r.try_get("lat")?,
            long: r.try_get("long")?,
            city_pop: r.try_get("city_pop")?,
            job: r.try_get("job")?,
            dob: r.try_get("dob")?,
            merch_lat: r.try_get("merch_lat")?,
            merch_long: r.try_get("merch_long")?,
        },
    })
}

/// Scored payments in Postgres.
#[derive(Debug, Clone)]
pub struct PgScoredPaymentStore {
    pool: PgPool,
}

impl PgScoredPaymentStore {
    /// Wraps a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_SCORED)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        sqlx::query(CREATE_LEDGER)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn upsert_tx(tx: &mut Transaction<'_, Postgres>, row: &ScoredPayment) -> Result<(), sqlx::Error> {
        let s = &row.snapshot;
        sqlx::query(UPSERT)
            .bind(&row.trans_num)
            .bind(s.event_time)
            .bind(&s.cc_num)
            .bind(&s.merchant)
            .bind(&s.category)
            .bind(s.amt)
            .bind(&s.first)
            .bind(&s.last)
            .bind(&s.gender)
            .bind(&s.street)
            .bind(&s.city)
            .bind(&s.state)
            .bind(s.zip)
            .bind(s.lat)
            .bind(s.long)
            .bind(s.city_pop)
            .bind(&s.job)
            .bind(&s.dob)
            .bind(s.merch_lat)
            .bind(s.merch_long)
            .bind(row.fraud_probability)
            .bind(row.fraud_flag)
            .bind(&row.model_version)
            .bind(row.scored_at)
            .bind(row.content_fingerprint())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ScoredPaymentStore for PgScoredPaymentStore {
    async fn upsert_batch(&self, rows: &[ScoredPayment]) -> Result<usize, StoreError> {
        for row in rows {
            check_row(row)?;
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for row in rows {
            // Dropping the transaction on error rolls it back.
            Self::upsert_tx(&mut tx, row).await.map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)?;
        Ok(rows.len())
    }

    async fn get(&self, trans_num: &str) -> Result<Option<ScoredPayment>, StoreError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM payments_scored WHERE trans_num = $1");
        let row = sqlx::query(&query)
            .bind(trans_num)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        row.as_ref()
            .map(row_to_payment)
            .transpose()
            .map_err(unavailable)
    }

    async fn daily_report(&self, day: NaiveDate) -> Result<DailyReport, StoreError> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*)::bigint AS total_payments,
                COUNT(*) FILTER (WHERE fraud_flag IS TRUE)::bigint AS total_frauds,
                COALESCE(SUM(amt) FILTER (WHERE fraud_flag IS TRUE), 0)::float8 AS fraud_amount
            FROM payments_scored
            WHERE (scored_at AT TIME ZONE 'UTC')::date = $1
            ",
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        let total: i64 = row.try_get("total_payments").map_err(unavailable)?;
        let frauds: i64 = row.try_get("total_frauds").map_err(unavailable)?;
        let amount: f64 = row.try_get("fraud_amount").map_err(unavailable)?;
        Ok(DailyReport::from_totals(
            day,
            u64::try_from(total).unwrap_or(0),
            u64::try_from(frauds).unwrap_or(0),
            amount,
        ))
    }

    async fn list_scored(&self, day: NaiveDate, fraud_only: bool) -> Result<Vec<ScoredPayment>, StoreError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM payments_scored \
             WHERE (scored_at AT TIME ZONE 'UTC')::date = $1 AND ($2 = FALSE OR fraud_flag IS TRUE) \
             ORDER BY scored_at DESC, trans_num"
        );
        let rows = sqlx::query(&query)
            .bind(day)
            .bind(fraud_only)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter()
            .map(row_to_payment)
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments_scored")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

/// Alert ledger in Postgres.
#[derive(Debug, Clone)]
pub struct PgAlertLedger {
    pool: PgPool,
}

impl PgAlertLedger {
    /// Wraps a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertLedger for PgAlertLedger {
    async fn contains(&self, trans_num: &str) -> Result<bool, StoreError> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT trans_num FROM alert_ledger WHERE trans_num = $1")
                .bind(trans_num)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;
        Ok(found.is_some())
    }

    async fn record(&self, trans_num: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("INSERT INTO alert_ledger (trans_num) VALUES ($1) ON CONFLICT (trans_num) DO NOTHING")
            .bind(trans_num)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() == 1)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alert_ledger")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}
