#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "session_entries",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS session_entries (
    user_id TEXT NOT NULL,
    entry_name TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at_unix INTEGER NOT NULL,
    PRIMARY KEY (user_id, entry_name)
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS session_entries;
"#,
};

const MIGRATIONS: [SqliteMigration; 1] = [MIGRATION_0001];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
