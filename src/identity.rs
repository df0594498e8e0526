//! Team and player identity for one match.
//!
//! Players are identified across files by the registry `source_id`, never by
//! display name. A roster name carrying a numbered suffix such as `"(2)"` means
//! the source itself could not tell two people apart; such matches are not
//! loaded at all.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{IdentityError, IngestError};
use crate::record::MatchInfo;
use crate::store::{self, PlayerId, TeamId};

static DISAMBIGUATION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\d+\)\s*$").expect("Invalid regex"));

/// Persisted identities for everyone named in a match's rosters.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMatch {
    pub teams: HashMap<String, TeamId>,
    /// Team name to playing XI, in roster order.
    pub rosters: HashMap<String, Vec<PlayerId>>,
    /// Display name as written in this file to player id.
    pub names: HashMap<String, PlayerId>,
}

impl ResolvedMatch {
    pub fn team(&self, name: &str) -> Result<TeamId, IdentityError> {
        self.teams
            .get(name)
            .copied()
            .ok_or_else(|| IdentityError::UnknownTeam {
                name: name.to_string(),
            })
    }

    pub fn roster(&self, team: &str) -> Vec<PlayerId> {
        self.rosters.get(team).cloned().unwrap_or_default()
    }

    pub fn player(&self, name: &str) -> Result<PlayerId, IdentityError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| IdentityError::UnknownPlayer {
                name: name.to_string(),
            })
    }

    /// Adds stored names that this file does not spell itself.
    pub fn absorb_stored_names(&mut self, stored: HashMap<String, PlayerId>) {
        for (name, id) in stored {
            self.names.entry(name).or_insert(id);
        }
    }
}

pub fn is_disambiguated_name(name: &str) -> bool {
    DISAMBIGUATION_MARKER.is_match(name)
}

/// Rejects the match before anything is written if any roster is unusable.
pub fn check_rosters(info: &MatchInfo) -> Result<(), IdentityError> {
    for (team, roster) in &info.players {
        for name in roster {
            if is_disambiguated_name(name) {
                return Err(IdentityError::Ambiguous {
                    team: team.clone(),
                    name: name.clone(),
                });
            }
            if !info.registry.people.contains_key(name) {
                return Err(IdentityError::Unregistered {
                    team: team.clone(),
                    name: name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Materializes teams and players for `info` and returns their ids.
///
/// Identity failures come back as [`IngestError::Identity`] before any row is
/// written; store failures as [`IngestError::Store`].
pub fn resolve_identities(
    conn: &Connection,
    info: &MatchInfo,
) -> Result<ResolvedMatch, IngestError> {
    check_rosters(info)?;

    let mut resolved = ResolvedMatch::default();
    for team in &info.teams {
        let id = store::ensure_team(conn, team)?;
        resolved.teams.insert(team.clone(), id);
    }

    for (team, roster) in &info.players {
        let team_id = resolved.team(team)?;

        let mut by_source_id = BTreeMap::new();
        let mut source_ids = Vec::with_capacity(roster.len());
        for name in roster {
            let Some(source_id) = info.registry.people.get(name) else {
                continue;
            };
            by_source_id.insert(source_id.clone(), name.clone());
            source_ids.push(source_id.clone());
        }

        let created = store::ensure_players_bulk(conn, &by_source_id, team_id)?;
        let ids = store::lookup_player_ids(conn, &source_ids)?;
        debug!(team = %team, team_id, created, roster = ids.len(), "resolved roster");

        for (name, id) in roster.iter().zip(&ids) {
            resolved.names.insert(name.clone(), *id);
        }
        resolved.rosters.insert(team.clone(), ids);
    }

    Ok(resolved)
}
