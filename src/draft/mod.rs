// Draft domain logic: players, state, order generation, pick application,
// auto-pick selection, and roster loading.

pub mod advance;
pub mod autopick;
pub mod order;
pub mod player;
pub mod roster;
pub mod state;
