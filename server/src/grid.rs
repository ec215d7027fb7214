//! Read-only occupancy view over the live world collections

use shared::{Player, Position, Wall};
use std::collections::HashMap;

/// Borrowed view of players and walls answering cell queries.
///
/// Built fresh from `WorldState` for each resolution step, so queries always
/// see the current collections.
#[derive(Clone, Copy)]
pub struct GridIndex<'a> {
    grid_size: i32,
    players: &'a HashMap<u32, Player>,
    walls: &'a [Wall],
}

impl<'a> GridIndex<'a> {
    pub fn new(grid_size: i32, players: &'a HashMap<u32, Player>, walls: &'a [Wall]) -> Self {
        Self {
            grid_size,
            players,
            walls,
        }
    }

    pub fn grid_size(&self) -> i32 {
        self.grid_size
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        (0..self.grid_size).contains(&x) && (0..self.grid_size).contains(&y)
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.in_bounds(pos.x, pos.y)
    }

    /// True when any wall or player claims the cell.
    pub fn is_occupied(&self, x: i32, y: i32) -> bool {
        self.walls.iter().any(|w| w.x == x && w.y == y)
            || self.players.values().any(|p| p.x == x && p.y == y)
    }

    pub fn is_free(&self, pos: Position) -> bool {
        self.contains(pos) && !self.is_occupied(pos.x, pos.y)
    }

    pub fn wall_at(&self, pos: Position) -> Option<&'a Wall> {
        self.walls.iter().find(|w| w.position() == pos)
    }

    pub fn players_at(&self, pos: Position) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .players
            .values()
            .filter(|p| p.position() == pos)
            .map(|p| p.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// In-bounds, unoccupied neighbours of `pos`.
    pub fn free_neighbors(&self, pos: Position) -> Vec<Position> {
        pos.neighbors()
            .into_iter()
            .filter(|n| self.is_free(*n))
            .collect()
    }
}
