use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;

/// One match document as published by the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(default)]
    pub meta: Value,
    pub info: MatchInfo,
    #[serde(default)]
    pub innings: Vec<Innings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    #[serde(default)]
    pub balls_per_over: Option<u32>,
    #[serde(default)]
    pub city: Option<String>,
    pub dates: Vec<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub event: Option<MatchEvent>,
    pub match_type: String,
    pub match_type_number: i64,
    #[serde(default)]
    pub overs: Option<i64>,
    /// Team name to the roster names listed for it, in file order.
    pub players: BTreeMap<String, Vec<String>>,
    pub registry: Registry,
    #[serde(default)]
    pub season: Option<Value>,
    pub teams: Vec<String>,
    pub toss: Toss,
    #[serde(default)]
    pub venue: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchEvent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub match_number: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    /// Display name to the source's stable person identifier.
    #[serde(default)]
    pub people: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toss {
    pub winner: String,
    pub decision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Innings {
    pub team: String,
    #[serde(default)]
    pub overs: Vec<Over>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Over {
    #[serde(rename = "over")]
    pub index: i64,
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub batter: String,
    pub bowler: String,
    pub non_striker: String,
    pub runs: Runs,
    #[serde(default)]
    pub wickets: Vec<Dismissal>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Runs {
    pub batter: i64,
    pub extras: i64,
    pub total: i64,
}

// Fielders are left out for now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dismissal {
    pub kind: String,
    pub player_out: String,
}

impl MatchInfo {
    pub fn toss_description(&self) -> String {
        format!(
            "{} won the toss and chose to {}",
            self.toss.winner, self.toss.decision
        )
    }

    pub fn event_name(&self) -> &str {
        self.event.as_ref().map(|e| e.name.as_str()).unwrap_or_default()
    }

    pub fn first_date(&self) -> &str {
        self.dates.first().map(String::as_str).unwrap_or_default()
    }

    /// Season is published either as a number or as a string like `"2019/20"`.
    pub fn season_label(&self) -> Option<String> {
        match self.season.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A decoded record together with where it came from.
#[derive(Debug, Clone)]
pub struct MatchFile {
    pub path: PathBuf,
    pub file_id: Option<i64>,
    pub record: MatchRecord,
}

pub fn decode_match(raw: &[u8]) -> Result<MatchRecord, ParseError> {
    let record = serde_json::from_slice::<MatchRecord>(raw)?;
    check_shape(&record)?;
    Ok(record)
}

pub fn read_match_file(path: &Path) -> Result<MatchFile, ParseError> {
    let raw = fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record = decode_match(&raw)?;
    Ok(MatchFile {
        path: path.to_path_buf(),
        file_id: file_id_from_path(path),
        record,
    })
}

/// Numeric filename stem, e.g. `1187669.json` -> `1187669`.
pub fn file_id_from_path(path: &Path) -> Option<i64> {
    path.file_stem()?.to_str()?.trim().parse::<i64>().ok()
}

/// Structural checks serde cannot express. Every team a match refers to must be
/// one of its two sides.
pub fn check_shape(record: &MatchRecord) -> Result<(), ParseError> {
    let info = &record.info;
    if info.teams.len() != 2 {
        return Err(ParseError::Schema(format!(
            "expected two teams, found {}",
            info.teams.len()
        )));
    }
    if info.teams[0] == info.teams[1] {
        return Err(ParseError::Schema(format!(
            "both sides are named {:?}",
            info.teams[0]
        )));
    }
    if info.dates.is_empty() {
        return Err(ParseError::Schema("match has no dates".to_string()));
    }
    if let Some(team) = info.players.keys().find(|t| !info.teams.contains(t)) {
        return Err(ParseError::Schema(format!(
            "roster for {team:?} does not belong to either side"
        )));
    }
    if let Some(innings) = record.innings.iter().find(|i| !info.teams.contains(&i.team)) {
        return Err(ParseError::Schema(format!(
            "innings batting team {:?} does not belong to either side",
            innings.team
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "meta": {"data_version": "1.1.0"},
        "info": {
            "dates": ["2021-03-14"],
            "match_type": "T20",
            "match_type_number": 1234,
            "players": {"A": ["a1"], "B": ["b1"]},
            "registry": {"people": {"a1": "s-a1", "b1": "s-b1"}},
            "teams": ["A", "B"],
            "toss": {"winner": "B", "decision": "field"},
            "season": "2020/21"
        },
        "innings": [{
            "team": "A",
            "overs": [{"over": 0, "deliveries": [
                {"batter": "a1", "bowler": "b1", "non_striker": "a1",
                 "runs": {"batter": 1, "extras": 0, "total": 1}}
            ]}]
        }]
    }"#;

    #[test]
    fn decodes_minimal_match() {
        let record = decode_match(MINIMAL.as_bytes()).unwrap();
        assert_eq!(record.info.match_type_number, 1234);
        assert_eq!(record.info.players["A"], vec!["a1".to_string()]);
        assert_eq!(record.innings[0].overs[0].index, 0);
        assert!(record.innings[0].overs[0].deliveries[0].wickets.is_empty());
        assert_eq!(record.info.event_name(), "");
        assert_eq!(record.info.season_label().as_deref(), Some("2020/21"));
    }

    #[test]
    fn toss_reads_as_sentence() {
        let record = decode_match(MINIMAL.as_bytes()).unwrap();
        assert_eq!(
            record.info.toss_description(),
            "B won the toss and chose to field"
        );
    }

    #[test]
    fn rejects_single_team() {
        let raw = MINIMAL.replace(r#""teams": ["A", "B"]"#, r#""teams": ["A"]"#);
        let err = decode_match(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::Schema(_)));
    }

    #[test]
    fn rejects_innings_for_unknown_team() {
        let raw = MINIMAL.replace(r#""team": "A""#, r#""team": "Aa""#);
        let err = decode_match(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::Schema(msg) if msg.contains("\"Aa\"")));
    }

    #[test]
    fn rejects_missing_match_number() {
        let raw = MINIMAL.replace(r#""match_type_number": 1234,"#, "");
        let err = decode_match(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn file_id_comes_from_stem() {
        assert_eq!(
            file_id_from_path(Path::new("t20s_male_json/1187669.json")),
            Some(1187669)
        );
        assert_eq!(file_id_from_path(Path::new("README.txt")), None);
    }
}
