use rusqlite::Connection;

/// Initialize the entitlement schema.
///
/// Everything lives in one key/value table so fields added later simply read
/// as absent on older databases and fall back to their defaults.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL lets feature gating read while a reconciliation write is committing
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;

        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}
