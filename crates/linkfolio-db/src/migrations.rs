use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (accounts)");
        // email and username are unique by convention only
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL,
                email           TEXT NOT NULL,
                niche           TEXT,
                name            TEXT,
                aboutme         TEXT,
                uniqueUrl       TEXT NOT NULL,
                image           TEXT,
                reward_links    TEXT,
                secondary_links TEXT,
                ecommerce       INTEGER
            );

            CREATE INDEX idx_accounts_email ON accounts(email);
            CREATE INDEX idx_accounts_username ON accounts(username);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
