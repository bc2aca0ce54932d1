// Pure pick application: validates a pick against a snapshot of the draft
// and produces the successor state. Callers commit the result with a
// compare-and-swap write; this module never touches storage or clocks.

use crate::draft::player::{PlayerId, TeamId};
use crate::draft::state::DraftState;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PickError {
    #[error("draft is already complete")]
    DraftComplete,
    #[error("player {0} is not in the available pool")]
    PlayerUnavailable(PlayerId),
    #[error("team {actual} tried to pick but team {expected} is on the clock")]
    WrongTeam { expected: TeamId, actual: TeamId },
    #[error("pick slot {0} is a forfeited slot and cannot receive a pick")]
    SkippedSlot(usize),
}

/// Apply a pick for the team on the clock.
///
/// Moves the player from the available pool onto the current team, records
/// the pick, and advances `current_pick_index` past any forfeited slots
/// that follow. The new deadline is `now + limit`, or `None` if the draft
/// just finished. `active_timer_task` is left untouched; rescheduling
/// happens when the resulting write lands.
pub fn advance(
    state: &DraftState,
    player_id: PlayerId,
    now: DateTime<Utc>,
    limit: Duration,
) -> Result<DraftState, PickError> {
    let team_id = validate_on_clock(state)?;
    advance_for_team(state, team_id, player_id, now, limit)
}

/// Like [`advance`], but also checks the pick comes from the team that is
/// actually on the clock. Human submissions go through this path.
pub fn advance_checked(
    state: &DraftState,
    team_id: TeamId,
    player_id: PlayerId,
    now: DateTime<Utc>,
    limit: Duration,
) -> Result<DraftState, PickError> {
    let expected = validate_on_clock(state)?;
    if expected != team_id {
        return Err(PickError::WrongTeam {
            expected,
            actual: team_id,
        });
    }
    advance_for_team(state, team_id, player_id, now, limit)
}

fn validate_on_clock(state: &DraftState) -> Result<TeamId, PickError> {
    if state.is_complete() {
        return Err(PickError::DraftComplete);
    }
    state
        .current_team_id()
        .ok_or(PickError::SkippedSlot(state.current_pick_index))
}

fn advance_for_team(
    state: &DraftState,
    team_id: TeamId,
    player_id: PlayerId,
    now: DateTime<Utc>,
    limit: Duration,
) -> Result<DraftState, PickError> {
    let mut next = state.clone();

    let pos = next
        .available_players
        .iter()
        .position(|p| p.id == player_id)
        .ok_or(PickError::PlayerUnavailable(player_id))?;
    let mut player = next.available_players.remove(pos);
    player.team_id = Some(team_id);

    // The slot's team id always resolves here; validate_on_clock already
    // rejected forfeited and out-of-range slots.
    if let Some(team) = next.team_mut(team_id) {
        team.players.push(player);
    }
    next.completed_picks.insert(next.current_pick_index, player_id);
    next.current_pick_index = next.next_live_index(next.current_pick_index + 1);
    next.pick_ends_at = if next.is_complete() {
        None
    } else {
        Some(now + limit)
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::player::{Player, Rank, RankTier, Role};
    use crate::draft::state::{PickSlot, Team};
    use std::collections::BTreeMap;

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

    fn limit() -> Duration {
        Duration::seconds(7200)
    }

    fn state() -> DraftState {
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
                PickSlot::Team { team_id: 2 },
                PickSlot::Skipped {
                    captain_name: "p20".to_string(),
                },
                PickSlot::Team { team_id: 1 },
            ],
            available_players: vec![player(30, Role::Mid), player(31, Role::Support)],
            completed_picks: BTreeMap::new(),
            current_pick_index: 0,
            pick_ends_at: Some(Utc::now()),
            active_timer_task: None,
        }
    }

    #[test]
    fn test_advance_moves_player_and_records_pick() {
        let now = Utc::now();
        let next = advance(&state(), 30, now, limit()).unwrap();
        assert_eq!(next.teams[0].players.len(), 2);
        assert_eq!(next.teams[0].players[1].id, 30);
        assert_eq!(next.available_players.len(), 1);
        assert_eq!(next.completed_picks.get(&0), Some(&30));
        assert_eq!(next.current_pick_index, 1);
        assert_eq!(next.pick_ends_at, Some(now + limit()));
    }

    #[test]
    fn test_drafted_player_gets_team_assignment() {
        let next = advance(&state(), 30, Utc::now(), limit()).unwrap();
        let drafted = next.teams[0]
            .players
            .iter()
            .find(|p| p.id == 30)
            .unwrap();
        assert_eq!(drafted.team_id, Some(1));
    }

    #[test]
    fn test_advance_skips_forfeited_slots() {
        let mut s = state();
        s.current_pick_index = 1;
        let next = advance(&s, 30, Utc::now(), limit()).unwrap();
        // Index 2 is forfeited, so the clock lands on index 3.
        assert_eq!(next.current_pick_index, 3);
    }

    #[test]
    fn test_final_pick_clears_deadline() {
        let mut s = state();
        s.current_pick_index = 3;
        let next = advance(&s, 31, Utc::now(), limit()).unwrap();
        assert!(next.is_complete());
        assert_eq!(next.pick_ends_at, None);
    }

    #[test]
    fn test_unavailable_player_rejected() {
        let err = advance(&state(), 99, Utc::now(), limit()).unwrap_err();
        assert_eq!(err, PickError::PlayerUnavailable(99));
    }

    #[test]
    fn test_already_drafted_player_rejected() {
        let now = Utc::now();
        let next = advance(&state(), 30, now, limit()).unwrap();
        let err = advance(&next, 30, now, limit()).unwrap_err();
        assert_eq!(err, PickError::PlayerUnavailable(30));
    }

    #[test]
    fn test_complete_draft_rejected() {
        let mut s = state();
        s.current_pick_index = 4;
        let err = advance(&s, 30, Utc::now(), limit()).unwrap_err();
        assert_eq!(err, PickError::DraftComplete);
    }

    #[test]
    fn test_wrong_team_rejected() {
        let err = advance_checked(&state(), 2, 30, Utc::now(), limit()).unwrap_err();
        assert_eq!(
            err,
            PickError::WrongTeam {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_skipped_slot_rejected() {
        let mut s = state();
        s.current_pick_index = 2;
        let err = advance(&s, 30, Utc::now(), limit()).unwrap_err();
        assert_eq!(err, PickError::SkippedSlot(2));
    }

    #[test]
    fn test_input_state_untouched() {
        let s = state();
        let _ = advance(&s, 30, Utc::now(), limit()).unwrap();
        assert_eq!(s.available_players.len(), 2);
        assert_eq!(s.current_pick_index, 0);
    }
}
