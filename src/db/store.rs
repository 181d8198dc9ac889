use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::error::Result;
use crate::models::{EntitlementRecord, Feature, SubscriptionTier, UsageCounters};

use super::{DbPool, create_memory_pool, create_pool};

/// Storage keys
pub mod keys {
    pub const TIER: &str = "entitlement.tier";
    pub const EXPIRY: &str = "entitlement.expiry";
    pub const FORMAT: &str = "entitlement.format";
    pub const WORKOUTS_TODAY: &str = "usage.workoutsToday";
    pub const MEDITATIONS_TODAY: &str = "usage.meditationsToday";
    pub const DAY: &str = "usage.day";
}

/// Serialization format of the entitlement keys.
pub const FORMAT_VERSION: &str = "1";

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Durable entitlement and daily usage state.
///
/// Constructed once at startup and cloned into every consumer; clones share
/// the same connection pool. Reads never fail: anything missing, malformed or
/// unreachable reads as the free tier with zeroed counters.
#[derive(Clone)]
pub struct EntitlementStore {
    pool: DbPool,
}

impl EntitlementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (or create) a store backed by the SQLite file at `path`.
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(create_pool(path)?))
    }

    /// Open a private store that lives as long as this value and its clones.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(create_memory_pool()?))
    }

    // ==================== Entitlement ====================

    pub fn read(&self) -> EntitlementRecord {
        match self.try_read() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Failed to read entitlement, treating as free: {}", e);
                EntitlementRecord::free()
            }
        }
    }

    fn try_read(&self) -> Result<EntitlementRecord> {
        let conn = self.pool.get()?;
        let format = get_value(&conn, keys::FORMAT)?;
        let tier = get_value(&conn, keys::TIER)?;
        let expiry = get_value(&conn, keys::EXPIRY)?;
        Ok(decode_entitlement(format, tier, expiry))
    }

    /// Replace the stored entitlement in a single transaction.
    pub fn write(&self, record: &EntitlementRecord) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        put_value(&tx, keys::FORMAT, FORMAT_VERSION)?;
        put_value(&tx, keys::TIER, record.tier.as_ref())?;
        match record.expires_at {
            Some(expires_at) => put_value(&tx, keys::EXPIRY, &expires_at.to_string())?,
            None => delete_value(&tx, keys::EXPIRY)?,
        }

        tx.commit()?;
        Ok(())
    }

    /// The tier feature gating must act on at `now` (Unix seconds).
    pub fn effective_tier(&self, now: i64) -> SubscriptionTier {
        self.read().effective_tier(now)
    }

    // ==================== Usage ====================

    /// Counters for `today`; a stale stored day reads as zero.
    pub fn usage(&self, today: NaiveDate) -> UsageCounters {
        match self.try_usage() {
            Ok(usage) => usage.as_of(today),
            Err(e) => {
                tracing::warn!("Failed to read usage counters, treating as zero: {}", e);
                UsageCounters::starting(today)
            }
        }
    }

    fn try_usage(&self) -> Result<UsageCounters> {
        let conn = self.pool.get()?;
        Ok(read_usage(&conn)?)
    }

    /// Add one use of `feature` to today's counter and return the new count.
    ///
    /// The stale-day reset and the increment commit together.
    pub fn increment_usage(&self, feature: Feature, today: NaiveDate) -> Result<u32> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut usage = read_usage(&tx)?.as_of(today);
        let count = usage.increment(feature);
        write_usage(&tx, &usage)?;

        tx.commit()?;
        Ok(count)
    }

    /// Zero both counters for `today`.
    pub fn reset_usage(&self, today: NaiveDate) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_usage(&tx, &UsageCounters::starting(today))?;
        tx.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for EntitlementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementStore")
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}

fn get_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
}

fn put_value(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn delete_value(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(())
}

fn read_usage(conn: &Connection) -> rusqlite::Result<UsageCounters> {
    let workouts = get_value(conn, keys::WORKOUTS_TODAY)?;
    let meditations = get_value(conn, keys::MEDITATIONS_TODAY)?;
    let day = get_value(conn, keys::DAY)?;
    Ok(decode_usage(workouts, meditations, day))
}

fn write_usage(conn: &Connection, usage: &UsageCounters) -> rusqlite::Result<()> {
    put_value(conn, keys::WORKOUTS_TODAY, &usage.workouts_today.to_string())?;
    put_value(conn, keys::MEDITATIONS_TODAY, &usage.meditations_today.to_string())?;
    put_value(conn, keys::DAY, &usage.day.format(DAY_FORMAT).to_string())?;
    Ok(())
}

/// Rebuild an entitlement from its stored strings.
///
/// Unknown formats, unknown tier names, unparseable expiries and paid tiers
/// without an expiry all read as free.
fn decode_entitlement(
    format: Option<String>,
    tier: Option<String>,
    expiry: Option<String>,
) -> EntitlementRecord {
    if let Some(format) = format.as_deref()
        && format != FORMAT_VERSION
    {
        tracing::warn!("Unsupported entitlement format {:?}, treating as free", format);
        return EntitlementRecord::free();
    }

    let Some(raw_tier) = tier else {
        return EntitlementRecord::free();
    };
    let Ok(tier) = raw_tier.parse::<SubscriptionTier>() else {
        tracing::warn!("Unknown subscription tier {:?} in store, treating as free", raw_tier);
        return EntitlementRecord::free();
    };

    let expires_at = match expiry {
        Some(raw) => match raw.parse::<i64>() {
            Ok(expires_at) => Some(expires_at),
            Err(_) => {
                tracing::warn!("Malformed entitlement expiry {:?}, treating as free", raw);
                return EntitlementRecord::free();
            }
        },
        None => None,
    };

    let record = EntitlementRecord { tier, expires_at };
    if !record.is_consistent() {
        tracing::warn!("Inconsistent entitlement {:?}, treating as free", record);
        return EntitlementRecord::free();
    }
    record
}

fn decode_usage(
    workouts: Option<String>,
    meditations: Option<String>,
    day: Option<String>,
) -> UsageCounters {
    let defaults = UsageCounters::default();
    let day = day
        .and_then(|d| NaiveDate::parse_from_str(&d, DAY_FORMAT).ok())
        .unwrap_or(defaults.day);

    UsageCounters {
        workouts_today: parse_counter(workouts),
        meditations_today: parse_counter(meditations),
        day,
    }
}

fn parse_counter(raw: Option<String>) -> u32 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(0)
}
