// Draft initialization: team creation and snake pick-order generation.
//
// Captains seed one team each in descending Elo order, so the strongest
// captain owns team 1. Strong captains pay for their pick position by
// forfeiting an early round: each captain's percentile within the full
// player pool maps to a bucket, and bucket k forfeits the captain's slot
// in round k+1.

use crate::config::DraftConfig;
use crate::draft::player::Player;
use crate::draft::state::{DraftState, PickSlot, Team};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no captains in the player pool; cannot form teams")]
    NoCaptains,
}

/// A freshly built draft plus non-fatal setup warnings the caller may
/// surface or ignore.
#[derive(Debug)]
pub struct SetupOutcome {
    pub state: DraftState,
    pub warnings: Vec<String>,
}

/// Build the initial draft state from the full player pool.
///
/// The pool is split into captains (one team each, team 1 belonging to
/// the strongest captain) and available players, both ordered by
/// descending Elo. The pick order is a snake: round order
/// reverses every round, and forfeited slots are baked in as
/// [`PickSlot::Skipped`] entries. The starting pick index is fast-forwarded
/// past any leading forfeits so the clock starts on a live slot.
pub fn build_draft(
    players: Vec<Player>,
    config: &DraftConfig,
    now: DateTime<Utc>,
) -> Result<SetupOutcome, SetupError> {
    let mut pool = players;
    pool.sort_by(|a, b| b.elo().cmp(&a.elo()).then_with(|| a.id.cmp(&b.id)));
    let total = pool.len();

    // Percentile of each captain within the whole pool, strongest first.
    let captains: Vec<(Player, f64)> = pool
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_captain)
        .map(|(idx, p)| (p.clone(), idx as f64 / total as f64))
        .collect();
    if captains.is_empty() {
        return Err(SetupError::NoCaptains);
    }

    let mut teams = Vec::with_capacity(captains.len());
    let mut forfeited_round: Vec<Option<usize>> = Vec::with_capacity(captains.len());
    for (i, (captain, percentile)) in captains.iter().enumerate() {
        let team_id = (i + 1) as u32;
        let mut rostered_captain = captain.clone();
        rostered_captain.team_id = Some(team_id);
        teams.push(Team {
            id: team_id,
            name: format!("Team {}", captain.name),
            captain_id: captain.id,
            players: vec![rostered_captain],
            wins: 0,
            losses: 0,
        });
        let round = config
            .skip_percentile_buckets
            .iter()
            .position(|bucket| *percentile <= *bucket)
            .filter(|r| *r < config.num_rounds);
        forfeited_round.push(round);
    }

    let mut pick_order = Vec::with_capacity(teams.len() * config.num_rounds);
    for round in 0..config.num_rounds {
        let mut slot_teams: Vec<usize> = (0..teams.len()).collect();
        if round % 2 == 1 {
            slot_teams.reverse();
        }
        for team_idx in slot_teams {
            if forfeited_round[team_idx] == Some(round) {
                pick_order.push(PickSlot::Skipped {
                    captain_name: captains[team_idx].0.name.clone(),
                });
            } else {
                pick_order.push(PickSlot::Team {
                    team_id: teams[team_idx].id,
                });
            }
        }
    }

    let available_players: Vec<Player> = pool.into_iter().filter(|p| !p.is_captain).collect();

    let mut warnings = Vec::new();
    let live_slots = pick_order
        .iter()
        .filter(|s| matches!(s, PickSlot::Team { .. }))
        .count();
    if available_players.len() < live_slots {
        warnings.push(format!(
            "player pool has {} available players for {} live slots; the draft will exhaust the pool",
            available_players.len(),
            live_slots
        ));
    }

    let mut state = DraftState {
        teams,
        pick_order,
        available_players,
        completed_picks: BTreeMap::new(),
        current_pick_index: 0,
        pick_ends_at: None,
        active_timer_task: None,
    };
    state.current_pick_index = state.next_live_index(0);
    if !state.is_complete() {
        state.pick_ends_at = Some(now + config.pick_time_limit());
    }

    Ok(SetupOutcome { state, warnings })
}
