//! Wall placement, removal and detonation

use crate::grid::GridIndex;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Player, Position, Wall};
use std::collections::HashMap;

/// A player pushed off a detonated cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Displacement {
    pub player_id: u32,
    pub from: Position,
    pub to: Position,
}

/// Lays a wall under `player`. Fails if the cell already holds one.
pub fn place(walls: &mut Vec<Wall>, player: &Player) -> bool {
    let cell = player.position();
    if walls.iter().any(|w| w.position() == cell) {
        return false;
    }

    walls.push(Wall::new(cell, Some(player.color.clone())));
    info!("Wall placed at {} by {}", cell, player.username);
    true
}

/// Removes the wall at `pos`, if any.
pub fn remove(walls: &mut Vec<Wall>, pos: Position) -> bool {
    match walls.iter().position(|w| w.position() == pos) {
        Some(index) => {
            walls.remove(index);
            true
        }
        None => false,
    }
}

/// Converts the triggering player's cell into a wall.
///
/// Everyone standing on the cell is first moved to a random free neighbour;
/// an occupant with no free neighbour stays where it is. Returns `None` when
/// the cell already holds a wall.
pub fn detonate<R: Rng>(
    rng: &mut R,
    grid_size: i32,
    players: &mut HashMap<u32, Player>,
    walls: &mut Vec<Wall>,
    trigger_id: u32,
) -> Option<(Wall, Vec<Displacement>)> {
    let (cell, color) = {
        let trigger = players.get(&trigger_id)?;
        (trigger.position(), trigger.color.clone())
    };
    if walls.iter().any(|w| w.position() == cell) {
        return None;
    }

    let occupants = GridIndex::new(grid_size, players, walls).players_at(cell);
    let mut displaced = Vec::new();

    for id in occupants {
        // Recomputed per occupant so two players never land on the same cell.
        let target = GridIndex::new(grid_size, players, walls)
            .free_neighbors(cell)
            .choose(&mut *rng)
            .copied();

        if let (Some(to), Some(player)) = (target, players.get_mut(&id)) {
            player.set_position(to);
            displaced.push(Displacement {
                player_id: id,
                from: cell,
                to,
            });
        }
    }

    let wall = Wall::new(cell, Some(color));
    walls.push(wall.clone());
    info!(
        "Wall detonated at {} by player {} ({} displaced)",
        cell,
        trigger_id,
        displaced.len()
    );
    Some((wall, displaced))
}
