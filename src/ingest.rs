use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, RunHalted, SqliteContext, StoreError};
use crate::identity;
use crate::record::{self, MatchFile};
use crate::store::{self, NewBall, NewEvent, NewWicket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An event for the same `match_id` is already stored.
    Duplicate,
    /// A roster or delivery name could not be tied to exactly one player.
    Ambiguous,
    ParseError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Persisted { match_id: i64, balls: usize },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub data_dir: PathBuf,
    pub files_seen: usize,
    pub matches_loaded: usize,
    pub duplicates_skipped: usize,
    /// Files that could not be read or decoded.
    pub skipped_items: usize,
    /// Matches abandoned because player identities could not be resolved.
    pub broken_matches: usize,
}

impl IngestSummary {
    fn record(&mut self, outcome: FileOutcome) {
        self.files_seen += 1;
        match outcome {
            FileOutcome::Persisted { .. } => self.matches_loaded += 1,
            FileOutcome::Skipped(SkipReason::Duplicate) => self.duplicates_skipped += 1,
            FileOutcome::Skipped(SkipReason::Ambiguous) => self.broken_matches += 1,
            FileOutcome::Skipped(SkipReason::ParseError) => self.skipped_items += 1,
        }
    }
}

/// Loads every match file under `config.data_dir`.
///
/// Per-file problems are counted and skipped. The first store failure stops
/// the run; the counters gathered up to that point travel in [`RunHalted`].
/// Either way the run is recorded in `ingest_runs`.
pub fn run_ingest(conn: &mut Connection, config: &IngestConfig) -> Result<IngestSummary, RunHalted> {
    let mut summary = IngestSummary {
        data_dir: config.data_dir.clone(),
        ..IngestSummary::default()
    };

    let run_id = match store::begin_run(conn, &config.data_dir.display().to_string()) {
        Ok(id) => id,
        Err(err) => {
            return Err(RunHalted {
                summary,
                error: err.into(),
            });
        }
    };

    let result = match discover_match_files(&config.data_dir) {
        Ok(files) => ingest_files(conn, &files, config.decode_batch, &mut summary),
        Err(err) => Err(err),
    };

    let halted_error = result.as_ref().err().map(|err| err.to_string());
    if let Err(err) = store::finish_run(conn, run_id, &summary, halted_error.as_deref()) {
        warn!(run_id, error = %err, "unable to record ingest run");
    }

    info!(
        files_seen = summary.files_seen,
        matches_loaded = summary.matches_loaded,
        duplicates_skipped = summary.duplicates_skipped,
        skipped_items = summary.skipped_items,
        broken_matches = summary.broken_matches,
        "ingest finished"
    );

    match result {
        Ok(()) => Ok(summary),
        Err(error) => Err(RunHalted { summary, error }),
    }
}

/// Match documents in `dir`, in filename order. Marker files such as
/// `README.txt` and anything else without a `.json` extension are left out.
pub fn discover_match_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let read_dir_err = |source| IngestError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let path = entry.map_err(read_dir_err)?.path();
        if !path.is_file() {
            continue;
        }
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            debug!(file = %path.display(), "ignoring non-match file");
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

fn ingest_files(
    conn: &mut Connection,
    files: &[PathBuf],
    decode_batch: usize,
    summary: &mut IngestSummary,
) -> Result<(), IngestError> {
    for chunk in files.chunks(decode_batch.max(1)) {
        let decoded = chunk
            .par_iter()
            .map(|path| record::read_match_file(path))
            .collect::<Vec<_>>();

        for (path, file) in chunk.iter().zip(decoded) {
            let outcome = match file {
                Ok(file) => ingest_match(conn, &file)?,
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "skipping undecodable file");
                    FileOutcome::Skipped(SkipReason::ParseError)
                }
            };
            summary.record(outcome);
        }
    }
    Ok(())
}

/// Reads, decodes and loads one file.
pub fn ingest_file(conn: &mut Connection, path: &Path) -> Result<FileOutcome, IngestError> {
    match record::read_match_file(path) {
        Ok(file) => ingest_match(conn, &file),
        Err(err) => {
            warn!(file = %path.display(), error = %err, "skipping undecodable file");
            Ok(FileOutcome::Skipped(SkipReason::ParseError))
        }
    }
}

/// Loads one decoded match inside a single transaction, so a match is either
/// stored with all of its deliveries or not at all.
pub fn ingest_match(conn: &mut Connection, file: &MatchFile) -> Result<FileOutcome, IngestError> {
    let match_id = file.record.info.match_type_number;
    if let Err(err) = record::check_shape(&file.record) {
        warn!(match_id, file = %file.path.display(), error = %err, "skipping malformed match");
        return Ok(FileOutcome::Skipped(SkipReason::ParseError));
    }
    if store::match_exists(conn, match_id)? {
        info!(match_id, file = %file.path.display(), "match already stored, skipping");
        return Ok(FileOutcome::Skipped(SkipReason::Duplicate));
    }

    let tx = conn.transaction().op("begin match transaction")?;
    match persist_match(&tx, file) {
        Ok(balls) => {
            tx.commit().op("commit match transaction")?;
            info!(match_id, balls, file = %file.path.display(), "saved match");
            Ok(FileOutcome::Persisted { match_id, balls })
        }
        Err(IngestError::Identity(err)) => {
            tx.rollback().op("roll back match transaction")?;
            warn!(match_id, file = %file.path.display(), error = %err, "abandoning match");
            Ok(FileOutcome::Skipped(SkipReason::Ambiguous))
        }
        Err(IngestError::Store(StoreError::DuplicateMatch { .. })) => {
            tx.rollback().op("roll back match transaction")?;
            info!(match_id, file = %file.path.display(), "match stored concurrently, skipping");
            Ok(FileOutcome::Skipped(SkipReason::Duplicate))
        }
        Err(err) => Err(err),
    }
}

/// Expects a record that passed [`record::check_shape`].
fn persist_match(conn: &Connection, file: &MatchFile) -> Result<usize, IngestError> {
    let record = &file.record;
    let info = &record.info;
    let match_id = info.match_type_number;
    let (team_a_name, team_b_name) = (&info.teams[0], &info.teams[1]);

    let mut resolved = identity::resolve_identities(conn, info)?;
    let event = NewEvent {
        file_id: file.file_id,
        match_id,
        name: info.event_name().to_string(),
        date: info.first_date().to_string(),
        team_a: resolved.team(team_a_name)?,
        team_b: resolved.team(team_b_name)?,
        playing_xi_a: resolved.roster(team_a_name),
        playing_xi_b: resolved.roster(team_b_name),
        venue: info.venue.clone(),
        city: info.city.clone(),
        gender: info.gender.clone(),
        season: info.season_label(),
        toss: info.toss_description(),
        overs: info.overs,
        match_type: info.match_type.clone(),
    };
    let event_id = store::create_event(conn, &event)?;
    debug!(match_id, event_id, event = %event.name, "saved event");

    resolved.absorb_stored_names(store::lookup_players_for_event(conn, match_id)?);

    let mut balls = 0usize;
    for (innings_index, innings) in record.innings.iter().enumerate() {
        let batting_team = resolved.team(&innings.team)?;
        for over in &innings.overs {
            for (position, delivery) in over.deliveries.iter().enumerate() {
                let batsman = resolved.player(&delivery.batter)?;
                let bowler = resolved.player(&delivery.bowler)?;
                let non_striker = resolved.player(&delivery.non_striker)?;

                let wicket = match delivery.wickets.first() {
                    Some(dismissal) => {
                        if delivery.wickets.len() > 1 {
                            debug!(match_id, over = over.index, position, "keeping first of several dismissals");
                        }
                        let wicket = NewWicket {
                            player: resolved.player(&dismissal.player_out)?,
                            kind: dismissal.kind.clone(),
                            bowler,
                            event: event_id,
                        };
                        Some(store::create_wicket(conn, &wicket)?)
                    }
                    None => None,
                };

                store::create_ball(
                    conn,
                    &NewBall {
                        event: event_id,
                        innings: innings_index as i64,
                        over: over.index,
                        ball: position as i64,
                        batting_team,
                        batsman,
                        bowler,
                        non_striker,
                        striker_run: delivery.runs.batter,
                        extra_run: delivery.runs.extras,
                        wicket,
                    },
                )?;
                balls += 1;
            }
        }
        debug!(
            match_id,
            innings = innings_index,
            team = %innings.team,
            overs = innings.overs.len(),
            "saved innings"
        );
    }
    Ok(balls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = IngestSummary::default();
        summary.record(FileOutcome::Persisted { match_id: 1, balls: 3 });
        summary.record(FileOutcome::Skipped(SkipReason::Duplicate));
        summary.record(FileOutcome::Skipped(SkipReason::Ambiguous));
        summary.record(FileOutcome::Skipped(SkipReason::ParseError));
        summary.record(FileOutcome::Skipped(SkipReason::ParseError));
        assert_eq!(summary.files_seen, 5);
        assert_eq!(summary.matches_loaded, 1);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.broken_matches, 1);
        assert_eq!(summary.skipped_items, 2);
    }

    #[test]
    fn discovery_skips_marker_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.txt"), "read me").unwrap();
        fs::write(dir.path().join("20.json"), "{}").unwrap();
        fs::write(dir.path().join("3.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        let files = discover_match_files(dir.path()).unwrap();
        let names = files
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["20.json", "3.json"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_match_files(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, IngestError::ReadDir { .. }));
    }
}
