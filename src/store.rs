use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::error::{SqliteContext, StoreError, StoreResult};
use crate::ingest::IngestSummary;

pub type TeamId = i64;
pub type PlayerId = i64;
pub type EventId = i64;
pub type WicketId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub file_id: Option<i64>,
    pub match_id: i64,
    pub name: String,
    pub date: String,
    pub team_a: TeamId,
    pub team_b: TeamId,
    pub playing_xi_a: Vec<PlayerId>,
    pub playing_xi_b: Vec<PlayerId>,
    pub venue: String,
    pub city: Option<String>,
    pub gender: Option<String>,
    pub season: Option<String>,
    pub toss: String,
    pub overs: Option<i64>,
    pub match_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWicket {
    pub player: PlayerId,
    pub kind: String,
    pub bowler: PlayerId,
    pub event: EventId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewBall {
    pub event: EventId,
    pub innings: i64,
    pub over: i64,
    pub ball: i64,
    pub batting_team: TeamId,
    pub batsman: PlayerId,
    pub bowler: PlayerId,
    pub non_striker: PlayerId,
    pub striker_run: i64,
    pub extra_run: i64,
    pub wicket: Option<WicketId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub id: EventId,
    pub file_id: Option<i64>,
    pub match_id: i64,
    pub name: String,
    pub date: String,
    pub team_a: TeamId,
    pub team_b: TeamId,
    pub playing_xi_a: Vec<PlayerId>,
    pub playing_xi_b: Vec<PlayerId>,
    pub venue: String,
    pub city: Option<String>,
    pub gender: Option<String>,
    pub season: Option<String>,
    pub toss: String,
    pub overs: Option<i64>,
    pub match_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBall {
    pub id: i64,
    pub innings: i64,
    pub over: i64,
    pub ball: i64,
    pub batting_team: TeamId,
    pub batsman: PlayerId,
    pub bowler: PlayerId,
    pub non_striker: PlayerId,
    pub striker_run: i64,
    pub extra_run: i64,
    pub wicket: Option<WicketId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub teams: i64,
    pub players: i64,
    pub events: i64,
    pub wickets: i64,
    pub balls: i64,
}

/// Create-or-fetch by unique name. A concurrent insert of the same name lands
/// on the conflict path and resolves to the existing row.
pub fn ensure_team(conn: &Connection, name: &str) -> StoreResult<TeamId> {
    let now = now_rfc3339();
    let inserted = conn
        .query_row(
            "INSERT INTO team (name, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(name) DO NOTHING
             RETURNING id",
            params![name, now],
            |row| row.get::<_, TeamId>(0),
        )
        .optional()
        .op("insert team")?;
    if let Some(id) = inserted {
        debug!(team = name, id, "created team");
        return Ok(id);
    }
    conn.query_row(
        "SELECT id FROM team WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .op("lookup team")
}

/// Inserts every `source_id -> name` pair for `team_id`, keeping existing rows
/// untouched. Returns how many players were new.
///
/// An existing `source_id` inserts nothing. Other per-row failures are logged
/// and skipped; only a failure to prepare the statement is returned.
pub fn ensure_players_bulk(
    conn: &Connection,
    players: &BTreeMap<String, String>,
    team_id: TeamId,
) -> StoreResult<usize> {
    let now = now_rfc3339();
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO player (name, source_id, team_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(source_id) DO NOTHING",
        )
        .op("prepare player insert")?;

    let mut created = 0usize;
    for (source_id, name) in players {
        match stmt.execute(params![name, source_id, team_id, now]) {
            Ok(0) => debug!(player = %name, source_id = %source_id, "player already exists"),
            Ok(n) => created += n,
            Err(err) => {
                warn!(
                    player = %name,
                    source_id = %source_id,
                    team_id,
                    error = %err,
                    "unable to save player"
                );
            }
        }
    }
    Ok(created)
}

/// Player ids for `source_ids`, in the same order. One query for the batch.
pub fn lookup_player_ids(conn: &Connection, source_ids: &[String]) -> StoreResult<Vec<PlayerId>> {
    if source_ids.is_empty() {
        return Ok(Vec::new());
    }
    let wanted = encode_json("source_ids", source_ids)?;
    let mut stmt = conn
        .prepare_cached(
            "SELECT source_id, id FROM player
             WHERE source_id IN (SELECT value FROM json_each(?1))",
        )
        .op("prepare player lookup")?;
    let rows = stmt
        .query_map(params![wanted], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, PlayerId>(1)?))
        })
        .op("query players by source id")?;

    let mut found = HashMap::with_capacity(source_ids.len());
    for row in rows {
        let (source_id, id) = row.op("decode player row")?;
        found.insert(source_id, id);
    }

    source_ids
        .iter()
        .map(|source_id| {
            found
                .get(source_id)
                .copied()
                .ok_or_else(|| StoreError::MissingPlayer {
                    source_id: source_id.clone(),
                })
        })
        .collect()
}

/// Stored display name to id for everyone in either playing XI of `match_id`.
pub fn lookup_players_for_event(
    conn: &Connection,
    match_id: i64,
) -> StoreResult<HashMap<String, PlayerId>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT p.id, p.name
             FROM event AS e
             JOIN player AS p ON p.id IN (
                 SELECT value FROM json_each(e.playing_xi_a)
                 UNION ALL
                 SELECT value FROM json_each(e.playing_xi_b)
             )
             WHERE e.match_id = ?1",
        )
        .op("prepare event players query")?;
    let rows = stmt
        .query_map(params![match_id], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, PlayerId>(0)?))
        })
        .op("query event players")?;

    let mut out = HashMap::new();
    for row in rows {
        let (name, id) = row.op("decode event player row")?;
        out.insert(name, id);
    }
    Ok(out)
}

pub fn match_exists(conn: &Connection, match_id: i64) -> StoreResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM event WHERE match_id = ?1)",
        params![match_id],
        |row| row.get::<_, bool>(0),
    )
    .op("check match exists")
}

/// Plain insert keyed on the unique `match_id`; a second insert for the same
/// match fails with [`StoreError::DuplicateMatch`].
pub fn create_event(conn: &Connection, event: &NewEvent) -> StoreResult<EventId> {
    let xi_a = encode_json("playing_xi_a", &event.playing_xi_a)?;
    let xi_b = encode_json("playing_xi_b", &event.playing_xi_b)?;
    let now = now_rfc3339();
    let result = conn.query_row(
        r#"
        INSERT INTO event (
            file_id, match_id, name, date, team_a, team_b,
            playing_xi_a, playing_xi_b, venue, city, gender, season,
            toss, overs, match_type, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?16
        )
        RETURNING id
        "#,
        params![
            event.file_id,
            event.match_id,
            event.name,
            event.date,
            event.team_a,
            event.team_b,
            xi_a,
            xi_b,
            event.venue,
            event.city,
            event.gender,
            event.season,
            event.toss,
            event.overs,
            event.match_type,
            now,
        ],
        |row| row.get::<_, EventId>(0),
    );
    match result {
        Ok(id) => Ok(id),
        Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateMatch {
            match_id: event.match_id,
        }),
        Err(source) => Err(StoreError::Sqlite {
            context: "insert event",
            source,
        }),
    }
}

pub fn create_wicket(conn: &Connection, wicket: &NewWicket) -> StoreResult<WicketId> {
    conn.prepare_cached(
        "INSERT INTO wicket (player, kind, bowler, event) VALUES (?1, ?2, ?3, ?4)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![
            wicket.player,
            wicket.kind,
            wicket.bowler,
            wicket.event
        ])
    })
    .op("insert wicket")?;
    Ok(conn.last_insert_rowid())
}

pub fn create_ball(conn: &Connection, ball: &NewBall) -> StoreResult<()> {
    let now = now_rfc3339();
    let mut stmt = conn
        .prepare_cached(
            r#"
            INSERT INTO ball_info (
                event, innings, "over", ball, batting_team,
                batsman, bowler, non_striker,
                striker_run, extra_run, wicket,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?12
            )
            "#,
        )
        .op("prepare ball insert")?;
    stmt.execute(params![
        ball.event,
        ball.innings,
        ball.over,
        ball.ball,
        ball.batting_team,
        ball.batsman,
        ball.bowler,
        ball.non_striker,
        ball.striker_run,
        ball.extra_run,
        ball.wicket,
        now,
    ])
    .op("insert ball")?;
    Ok(())
}

pub fn load_event(conn: &Connection, match_id: i64) -> StoreResult<Option<StoredEvent>> {
    let row = conn
        .query_row(
            r#"
            SELECT id, file_id, match_id, name, date, team_a, team_b,
                   playing_xi_a, playing_xi_b, venue, city, gender, season,
                   toss, overs, match_type
            FROM event
            WHERE match_id = ?1
            "#,
            params![match_id],
            |row| {
                Ok((
                    StoredEvent {
                        id: row.get(0)?,
                        file_id: row.get(1)?,
                        match_id: row.get(2)?,
                        name: row.get(3)?,
                        date: row.get(4)?,
                        team_a: row.get(5)?,
                        team_b: row.get(6)?,
                        playing_xi_a: Vec::new(),
                        playing_xi_b: Vec::new(),
                        venue: row.get(9)?,
                        city: row.get(10)?,
                        gender: row.get(11)?,
                        season: row.get(12)?,
                        toss: row.get(13)?,
                        overs: row.get(14)?,
                        match_type: row.get(15)?,
                    },
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )
        .optional()
        .op("load event")?;

    let Some((mut event, xi_a, xi_b)) = row else {
        return Ok(None);
    };
    event.playing_xi_a = decode_json("playing_xi_a", &xi_a)?;
    event.playing_xi_b = decode_json("playing_xi_b", &xi_b)?;
    Ok(Some(event))
}

/// Deliveries of one event in file order.
pub fn load_balls(conn: &Connection, event: EventId) -> StoreResult<Vec<StoredBall>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, innings, "over", ball, batting_team, batsman, bowler,
                   non_striker, striker_run, extra_run, wicket
            FROM ball_info
            WHERE event = ?1
            ORDER BY innings ASC, "over" ASC, ball ASC
            "#,
        )
        .op("prepare load balls")?;
    let rows = stmt
        .query_map(params![event], |row| {
            Ok(StoredBall {
                id: row.get(0)?,
                innings: row.get(1)?,
                over: row.get(2)?,
                ball: row.get(3)?,
                batting_team: row.get(4)?,
                batsman: row.get(5)?,
                bowler: row.get(6)?,
                non_striker: row.get(7)?,
                striker_run: row.get(8)?,
                extra_run: row.get(9)?,
                wicket: row.get(10)?,
            })
        })
        .op("query load balls")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.op("decode ball row")?);
    }
    Ok(out)
}

pub fn table_counts(conn: &Connection) -> StoreResult<TableCounts> {
    conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM team),
            (SELECT COUNT(*) FROM player),
            (SELECT COUNT(*) FROM event),
            (SELECT COUNT(*) FROM wicket),
            (SELECT COUNT(*) FROM ball_info)",
        [],
        |row| {
            Ok(TableCounts {
                teams: row.get(0)?,
                players: row.get(1)?,
                events: row.get(2)?,
                wickets: row.get(3)?,
                balls: row.get(4)?,
            })
        },
    )
    .op("count rows")
}

pub fn begin_run(conn: &Connection, data_dir: &str) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO ingest_runs (
            started_at, finished_at, data_dir, files_seen, matches_loaded,
            duplicates_skipped, skipped_items, broken_matches, halted_error
         ) VALUES (?1, NULL, ?2, 0, 0, 0, 0, 0, NULL)",
        params![now_rfc3339(), data_dir],
    )
    .op("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(
    conn: &Connection,
    run_id: i64,
    summary: &IngestSummary,
    halted_error: Option<&str>,
) -> StoreResult<()> {
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, files_seen = ?2, matches_loaded = ?3,
             duplicates_skipped = ?4, skipped_items = ?5, broken_matches = ?6,
             halted_error = ?7
         WHERE run_id = ?8",
        params![
            now_rfc3339(),
            summary.files_seen as i64,
            summary.matches_loaded as i64,
            summary.duplicates_skipped as i64,
            summary.skipped_items as i64,
            summary.broken_matches as i64,
            halted_error,
            run_id,
        ],
    )
    .op("update ingest run")?;
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn encode_json<T: serde::Serialize + ?Sized>(
    column: &'static str,
    value: &T,
) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|source| StoreError::Encode { column, source })
}

fn decode_json<T: serde::de::DeserializeOwned>(column: &'static str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|source| StoreError::Encode { column, source })
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
