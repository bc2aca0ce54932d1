// Core draft state: teams, the snake pick order, and pick progress.

use crate::draft::player::{Player, PlayerId, Role, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One slot in the flattened pick order. A slot either belongs to a team
/// or was forfeited up front by a highly-ranked captain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PickSlot {
    Team { team_id: TeamId },
    Skipped { captain_name: String },
}

impl PickSlot {
    pub fn team_id(&self) -> Option<TeamId> {
        match self {
            PickSlot::Team { team_id } => Some(*team_id),
            PickSlot::Skipped { .. } => None,
        }
    }
}

/// A drafting team. The captain is always `players[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub captain_id: PlayerId,
    pub players: Vec<Player>,
    /// Season record. Carried on the document for the surrounding league
    /// tooling; drafting never touches it.
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

impl Team {
    /// Roles not yet covered by any rostered player's primary role.
    pub fn needed_roles(&self) -> Vec<Role> {
        Role::ALL
            .iter()
            .copied()
            .filter(|role| !self.players.iter().any(|p| p.role == *role))
            .collect()
    }
}

/// Full state of a live draft. Persisted as a single versioned document;
/// all mutation goes through compare-and-swap writes so concurrent humans
/// and timers cannot double-commit a pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftState {
    pub teams: Vec<Team>,
    pub pick_order: Vec<PickSlot>,
    /// Players still undrafted, in descending Elo order.
    pub available_players: Vec<Player>,
    /// Committed picks, keyed by pick index.
    pub completed_picks: BTreeMap<usize, PlayerId>,
    pub current_pick_index: usize,
    /// Deadline for the current pick. `None` once the draft is over.
    pub pick_ends_at: Option<DateTime<Utc>>,
    /// Handle of the delayed auto-pick task armed for the current pick.
    pub active_timer_task: Option<String>,
}

impl DraftState {
    pub fn is_complete(&self) -> bool {
        self.current_pick_index >= self.pick_order.len()
    }

    /// Team on the clock, or `None` if the draft is complete or the
    /// current slot is a forfeit.
    pub fn current_team_id(&self) -> Option<TeamId> {
        self.pick_order
            .get(self.current_pick_index)
            .and_then(|slot| slot.team_id())
    }

    pub fn team(&self, team_id: TeamId) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == team_id)
    }

    pub fn team_mut(&mut self, team_id: TeamId) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.id == team_id)
    }

    /// Smallest pick index at or after `from` that is not a forfeited
    /// slot. Returns `pick_order.len()` when none remains.
    pub fn next_live_index(&self, from: usize) -> usize {
        let mut idx = from;
        while idx < self.pick_order.len() {
            if matches!(self.pick_order[idx], PickSlot::Team { .. }) {
                break;
            }
            idx += 1;
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::player::{Rank, RankTier};

    fn player(id: PlayerId, role: Role) -> Player {
        Player {
            id,
            name: format!("p{id}"),
            role,
            secondary_roles: vec![],
            is_captain: false,
            team_id: None,
            peak_rank: Rank::new(RankTier::Gold, 2),
            solo_rank: Rank::UNRANKED,
            flex_rank: Rank::UNRANKED,
        }
    }

    fn two_team_state() -> DraftState {
        DraftState {
            teams: vec![
                Team {
                    id: 1,
                    name: "Team A".to_string(),
                    captain_id: 10,
                    players: vec![player(10, Role::Top)],
                    wins: 0,
                    losses: 0,
                },
                Team {
                    id: 2,
                    name: "Team B".to_string(),
                    captain_id: 20,
                    players: vec![player(20, Role::Jungle)],
                    wins: 0,
                    losses: 0,
                },
            ],
            pick_order: vec![
                PickSlot::Team { team_id: 1 },
                PickSlot::Skipped {
                    captain_name: "p20".to_string(),
                },
                PickSlot::Team { team_id: 2 },
                PickSlot::Team { team_id: 1 },
            ],
            available_players: vec![player(30, Role::Mid), player(31, Role::Support)],
            completed_picks: BTreeMap::new(),
            current_pick_index: 0,
            pick_ends_at: None,
            active_timer_task: None,
        }
    }

    #[test]
    fn test_current_team_on_live_slot() {
        let state = two_team_state();
        assert_eq!(state.current_team_id(), Some(1));
    }

    #[test]
    fn test_current_team_none_on_skipped_slot() {
        let mut state = two_team_state();
        state.current_pick_index = 1;
        assert_eq!(state.current_team_id(), None);
    }

    #[test]
    fn test_next_live_index_jumps_forfeits() {
        let state = two_team_state();
        assert_eq!(state.next_live_index(1), 2);
        assert_eq!(state.next_live_index(2), 2);
    }

    #[test]
    fn test_next_live_index_at_end() {
        let state = two_team_state();
        assert_eq!(state.next_live_index(4), 4);
    }

    #[test]
    fn test_is_complete() {
        let mut state = two_team_state();
        assert!(!state.is_complete());
        state.current_pick_index = 4;
        assert!(state.is_complete());
    }

    #[test]
    fn test_team_deserializes_without_record_fields() {
        // Older persisted documents predate the win/loss counters.
        let mut value = serde_json::to_value(&two_team_state().teams[0]).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("wins");
        obj.remove("losses");
        let team: Team = serde_json::from_value(value).unwrap();
        assert_eq!(team.wins, 0);
        assert_eq!(team.losses, 0);
    }

    #[test]
    fn test_needed_roles_excludes_rostered_primaries() {
        let state = two_team_state();
        let needed = state.teams[0].needed_roles();
        assert!(!needed.contains(&Role::Top));
        assert!(needed.contains(&Role::Mid));
        assert_eq!(needed.len(), 4);
    }
}
