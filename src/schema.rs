use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::{SqliteContext, StoreResult};

pub fn open_db(path: &Path, busy_timeout: Duration) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(path).op("open sqlite db")?;
    conn.busy_timeout(busy_timeout).op("set busy timeout")?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .op("enable wal")?;
    prepare(&conn)?;
    Ok(conn)
}

/// Fresh schema in memory; used by tests and the benchmarks.
pub fn open_memory_db() -> StoreResult<Connection> {
    let conn = Connection::open_in_memory().op("open in-memory db")?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .op("enable foreign keys")?;
    init_schema(conn)
}

pub fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS team (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS player (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            team_id INTEGER NOT NULL REFERENCES team(id),
            source_id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_player_name ON player(name);

        CREATE TABLE IF NOT EXISTS event (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NULL,
            match_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            date TEXT NOT NULL,
            team_a INTEGER NOT NULL REFERENCES team(id),
            team_b INTEGER NOT NULL REFERENCES team(id),
            playing_xi_a TEXT NOT NULL,
            playing_xi_b TEXT NOT NULL,
            venue TEXT NOT NULL,
            city TEXT NULL,
            gender TEXT NULL,
            season TEXT NULL,
            toss TEXT NOT NULL,
            overs INTEGER NULL,
            match_type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wicket (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player INTEGER NOT NULL REFERENCES player(id),
            kind TEXT NOT NULL,
            bowler INTEGER NOT NULL REFERENCES player(id),
            event INTEGER NOT NULL REFERENCES event(id)
        );
        CREATE INDEX IF NOT EXISTS idx_wicket_event ON wicket(event);

        CREATE TABLE IF NOT EXISTS ball_info (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event INTEGER NOT NULL REFERENCES event(id),
            innings INTEGER NOT NULL,
            "over" INTEGER NOT NULL,
            ball INTEGER NOT NULL,
            batting_team INTEGER NOT NULL REFERENCES team(id),
            batsman INTEGER NOT NULL REFERENCES player(id),
            bowler INTEGER NOT NULL REFERENCES player(id),
            non_striker INTEGER NOT NULL REFERENCES player(id),
            striker_run INTEGER NOT NULL,
            extra_run INTEGER NOT NULL,
            wicket INTEGER NULL REFERENCES wicket(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ball_info_order ON ball_info(event, innings, "over", ball);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            data_dir TEXT NOT NULL,
            files_seen INTEGER NOT NULL,
            matches_loaded INTEGER NOT NULL,
            duplicates_skipped INTEGER NOT NULL,
            skipped_items INTEGER NOT NULL,
            broken_matches INTEGER NOT NULL,
            halted_error TEXT NULL
        );
        "#,
    )
    .op("create sqlite schema")
}
