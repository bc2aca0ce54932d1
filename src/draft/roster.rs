// Player pool loading from CSV roster files.
//
// Expected columns: id, name, role, secondary_roles (semicolon-separated,
// may be empty), is_captain, then tier/division pairs for the peak, solo,
// and flex queues. Tiers are case-insensitive; an empty tier is unranked.

use crate::draft::player::{Player, PlayerId, Rank, RankTier, Role};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, serde::Deserialize)]
struct RawPlayer {
    id: PlayerId,
    name: String,
    role: String,
    #[serde(default)]
    secondary_roles: String,
    #[serde(default)]
    is_captain: bool,
    #[serde(default)]
    peak_tier: String,
    #[serde(default)]
    peak_division: u32,
    #[serde(default)]
    solo_tier: String,
    #[serde(default)]
    solo_division: u32,
    #[serde(default)]
    flex_tier: String,
    #[serde(default)]
    flex_division: u32,
}

fn parse_rank(tier: &str, division: u32) -> Option<Rank> {
    RankTier::from_str_tier(tier).map(|tier| Rank::new(tier, division))
}

fn load_from_reader<R: Read>(rdr: R) -> Result<Vec<Player>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawPlayer>() {
        match result {
            Ok(raw) => {
                let Some(role) = Role::from_str_role(&raw.role) else {
                    warn!("skipping player '{}': unknown role '{}'", raw.name.trim(), raw.role);
                    continue;
                };
                let secondary_roles: Vec<Role> = raw
                    .secondary_roles
                    .split(';')
                    .filter(|s| !s.trim().is_empty())
                    .filter_map(Role::from_str_role)
                    .collect();
                let Some(peak_rank) = parse_rank(&raw.peak_tier, raw.peak_division) else {
                    warn!("skipping player '{}': unknown tier '{}'", raw.name.trim(), raw.peak_tier);
                    continue;
                };
                let Some(solo_rank) = parse_rank(&raw.solo_tier, raw.solo_division) else {
                    warn!("skipping player '{}': unknown tier '{}'", raw.name.trim(), raw.solo_tier);
                    continue;
                };
                let Some(flex_rank) = parse_rank(&raw.flex_tier, raw.flex_division) else {
                    warn!("skipping player '{}': unknown tier '{}'", raw.name.trim(), raw.flex_tier);
                    continue;
                };
                players.push(Player {
                    id: raw.id,
                    name: raw.name.trim().to_string(),
                    role,
                    secondary_roles,
                    is_captain: raw.is_captain,
                    team_id: None,
                    peak_rank,
                    solo_rank,
                    flex_rank,
                });
            }
            Err(e) => {
                warn!("skipping malformed roster row: {}", e);
            }
        }
    }
    Ok(players)
}

/// Load the player pool from a roster CSV file.
pub fn load_roster(path: &Path) -> Result<Vec<Player>, RosterError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| RosterError::Io {
        path: display.clone(),
        source: e,
    })?;
    let players = load_from_reader(file).map_err(|e| RosterError::Csv {
        path: display,
        source: e,
    })?;
    validate(&players)?;
    Ok(players)
}

fn validate(players: &[Player]) -> Result<(), RosterError> {
    if players.is_empty() {
        return Err(RosterError::Validation(
            "roster contains no usable players".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for player in players {
        if !seen.insert(player.id) {
            return Err(RosterError::Validation(format!(
                "duplicate player id {} in roster",
                player.id
            )));
        }
        if player.name.is_empty() {
            return Err(RosterError::Validation(format!(
                "player {} has an empty name",
                player.id
            )));
        }
    }
    Ok(())
}
