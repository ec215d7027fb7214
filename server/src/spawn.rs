//! Spawn cell selection for joining players

use log::warn;
use rand::Rng;
use shared::Position;

pub const MAX_SPAWN_ATTEMPTS: u32 = 1000;

/// Used when every sampled cell was occupied.
pub const FALLBACK_SPAWN: Position = Position::new(0, 0);

/// Samples random cells until one is free.
///
/// Gives up after [`MAX_SPAWN_ATTEMPTS`] samples and returns
/// [`FALLBACK_SPAWN`], even if that cell is occupied. A crowded grid must
/// never fail a join.
pub fn find_spawn<R, F>(rng: &mut R, grid_size: i32, is_occupied: F) -> Position
where
    R: Rng,
    F: Fn(Position) -> bool,
{
    if grid_size <= 0 {
        return FALLBACK_SPAWN;
    }

    for _ in 0..MAX_SPAWN_ATTEMPTS {
        let candidate = Position::new(rng.gen_range(0..grid_size), rng.gen_range(0..grid_size));
        if !is_occupied(candidate) {
            return candidate;
        }
    }

    warn!(
        "No free spawn cell after {} attempts, falling back to {}",
        MAX_SPAWN_ATTEMPTS, FALLBACK_SPAWN
    );
    FALLBACK_SPAWN
}

/// Random `#rrggbb` display color.
pub fn random_color<R: Rng>(rng: &mut R) -> String {
    format!("#{:06x}", rng.gen_range(0..=0xFF_FFFFu32))
}
