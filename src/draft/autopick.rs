// Automatic pick selection for expired timers.
//
// Preference order: a priority-list player whose role the team still
// needs, then any available priority-list player, then the strongest
// player left in the pool. Player ids are matched exactly; id 0 is a
// valid id like any other.

use crate::draft::player::{Player, PlayerId};
use crate::draft::state::Team;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AutoPickError {
    #[error("no players available to auto-pick")]
    NoPlayersAvailable,
}

/// Choose a player for a team whose pick timer expired.
///
/// `priority` is the captain's ordered wishlist; entries that are no
/// longer available are skipped. The Elo fallback breaks ties on the
/// lower player id so the result is deterministic.
pub fn select_auto_pick(
    priority: &[PlayerId],
    team: &Team,
    available: &[Player],
) -> Result<PlayerId, AutoPickError> {
    if available.is_empty() {
        return Err(AutoPickError::NoPlayersAvailable);
    }

    let needed = team.needed_roles();

    // Pass 1: wishlist player filling a hole in the roster.
    for id in priority {
        if let Some(p) = available.iter().find(|p| p.id == *id) {
            if needed.contains(&p.role) {
                return Ok(p.id);
            }
        }
    }

    // Pass 2: any wishlist player still on the board.
    for id in priority {
        if available.iter().any(|p| p.id == *id) {
            return Ok(*id);
        }
    }

    // Pass 3: best player available.
    let best = available
        .iter()
        .max_by(|a, b| a.elo().cmp(&b.elo()).then_with(|| b.id.cmp(&a.id)));
    match best {
        Some(p) => Ok(p.id),
        None => Err(AutoPickError::NoPlayersAvailable),
    }
}
