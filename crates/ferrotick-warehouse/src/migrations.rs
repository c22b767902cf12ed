use duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_catalog",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS catalog_id_seq START 1;

CREATE TABLE IF NOT EXISTS catalog (
    id BIGINT PRIMARY KEY DEFAULT nextval('catalog_id_seq'),
    symbol TEXT NOT NULL,
    granularity TEXT,
    dataset TEXT NOT NULL,
    partition_key TEXT NOT NULL,
    file_path TEXT NOT NULL UNIQUE,
    storage_format TEXT NOT NULL,
    row_count BIGINT NOT NULL,
    min_ts BIGINT,
    max_ts BIGINT,
    data_source TEXT,
    content_hash TEXT NOT NULL,
    file_size_bytes BIGINT NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_lineage",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS lineage_id_seq START 1;

CREATE TABLE IF NOT EXISTS lineage (
    id BIGINT PRIMARY KEY DEFAULT nextval('lineage_id_seq'),
    run_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    symbol TEXT NOT NULL,
    granularity TEXT,
    partition_key TEXT NOT NULL,
    recorded_at BIGINT NOT NULL
);
"#,
    },
    Migration {
        version: "0003_indexes",
        sql: r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_catalog_partition ON catalog(symbol, dataset, partition_key);
CREATE INDEX IF NOT EXISTS idx_catalog_symbol ON catalog(symbol);
CREATE INDEX IF NOT EXISTS idx_catalog_symbol_granularity ON catalog(symbol, granularity);
CREATE INDEX IF NOT EXISTS idx_catalog_time ON catalog(min_ts, max_ts);
CREATE INDEX IF NOT EXISTS idx_lineage_run_id ON lineage(run_id);
CREATE INDEX IF NOT EXISTS idx_lineage_content_hash ON lineage(content_hash);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
