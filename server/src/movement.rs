//! Move and wall-removal resolution
//!
//! Resolution is split in two: [`MovementResolver::resolve`] inspects a
//! read-only [`GridIndex`] and decides what the action does, and
//! [`MovementResolver::apply`] commits that decision to the player and wall
//! collections owned by `WorldState`. Nothing here ever reports an error;
//! stale or malformed input simply resolves to a no-op outcome.

use crate::config::{BoundsPolicy, LastDirPolicy};
use crate::grid::GridIndex;
use crate::walls;
use log::{debug, trace};
use shared::{Direction, Player, Position, Wall};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved {
        from: Position,
        to: Position,
        dir: Direction,
    },
    WallRemoved(Position),
    /// Removal aimed at an in-bounds cell without a wall
    RemovalMissed(Position),
    /// Target cell held a player or a wall
    Blocked(Position),
    OutOfBounds,
    Ignored,
}

impl MoveOutcome {
    /// True when the world changed.
    pub fn is_change(&self) -> bool {
        matches!(self, MoveOutcome::Moved { .. } | MoveOutcome::WallRemoved(_))
    }

    fn is_removal_action(&self) -> bool {
        matches!(
            self,
            MoveOutcome::WallRemoved(_) | MoveOutcome::RemovalMissed(_)
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MovementResolver {
    pub bounds: BoundsPolicy,
    pub last_dir: LastDirPolicy,
}

impl MovementResolver {
    pub fn new(bounds: BoundsPolicy, last_dir: LastDirPolicy) -> Self {
        Self { bounds, last_dir }
    }

    pub fn resolve(
        &self,
        player: &Player,
        direction: Option<Direction>,
        removal_requested: bool,
        grid: &GridIndex<'_>,
    ) -> MoveOutcome {
        // Without a remembered direction the modifier is ignored and the
        // action falls through to a plain move.
        if removal_requested {
            if let Some(last) = player.last_dir {
                return self.resolve_removal(player, direction.unwrap_or(last), grid);
            }
        }

        let Some(dir) = direction else {
            return MoveOutcome::Ignored;
        };

        let from = player.position();
        let mut target = from.offset(dir);

        if !grid.contains(target) {
            match self.bounds {
                BoundsPolicy::Reject => return MoveOutcome::OutOfBounds,
                BoundsPolicy::Clamp => {
                    let max = grid.grid_size() - 1;
                    target = Position::new(target.x.clamp(0, max), target.y.clamp(0, max));
                    if target == from {
                        return MoveOutcome::OutOfBounds;
                    }
                }
            }
        }

        if grid.is_occupied(target.x, target.y) {
            return MoveOutcome::Blocked(target);
        }

        MoveOutcome::Moved {
            from,
            to: target,
            dir,
        }
    }

    fn resolve_removal(&self, player: &Player, dir: Direction, grid: &GridIndex<'_>) -> MoveOutcome {
        let target = player.position().offset(dir);
        if !grid.contains(target) {
            return MoveOutcome::OutOfBounds;
        }
        if grid.wall_at(target).is_some() {
            MoveOutcome::WallRemoved(target)
        } else {
            MoveOutcome::RemovalMissed(target)
        }
    }

    /// Commits `outcome` to the mover and the wall list.
    pub fn apply(&self, outcome: MoveOutcome, player: &mut Player, walls: &mut Vec<Wall>) {
        match outcome {
            MoveOutcome::Moved { to, dir, .. } => {
                player.set_position(to);
                player.last_dir = Some(dir);
                trace!("Player {} moved {} to {}", player.id, dir, to);
            }
            MoveOutcome::WallRemoved(pos) => {
                if walls::remove(walls, pos) {
                    debug!("Wall removed at {} by {}", pos, player.username);
                }
            }
            MoveOutcome::RemovalMissed(_)
            | MoveOutcome::Blocked(_)
            | MoveOutcome::OutOfBounds
            | MoveOutcome::Ignored => {}
        }

        if outcome.is_removal_action() {
            self.forget_direction(player);
        }
    }

    /// Called for any action that is not a plain move.
    pub fn forget_direction(&self, player: &mut Player) {
        if self.last_dir == LastDirPolicy::PreviousMove {
            player.last_dir = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn player(id: u32, x: i32, y: i32) -> Player {
        Player::new(id, Position::new(x, y), "#102030".into(), format!("p{}", id))
    }

    fn resolver() -> MovementResolver {
        MovementResolver::new(BoundsPolicy::Clamp, LastDirPolicy::AnyAction)
    }

    fn step(
        resolver: &MovementResolver,
        players: &mut HashMap<u32, Player>,
        walls: &mut Vec<Wall>,
        id: u32,
        dir: Option<Direction>,
        removal: bool,
    ) -> MoveOutcome {
        let outcome = {
            let grid = GridIndex::new(25, players, walls);
            resolver.resolve(&players[&id], dir, removal, &grid)
        };
        let mover = players.get_mut(&id).unwrap();
        resolver.apply(outcome, mover, walls);
        outcome
    }

    #[test]
    fn test_move_then_blocked_by_wall() {
        let mut players = HashMap::new();
        players.insert(1, player(1, 5, 5));
        let mut walls = Vec::new();
        let r = resolver();

        let outcome = step(&r, &mut players, &mut walls, 1, Some(Direction::Right), false);
        assert!(outcome.is_change());
        assert_eq!(players[&1].position(), Position::new(6, 5));
        assert_eq!(players[&1].last_dir, Some(Direction::Right));

        walls.push(Wall::new(Position::new(7, 5), None));
        let outcome = step(&r, &mut players, &mut walls, 1, Some(Direction::Right), false);
        assert_eq!(outcome, MoveOutcome::Blocked(Position::new(7, 5)));
        assert_eq!(players[&1].position(), Position::new(6, 5));
    }

    #[test]
    fn test_blocked_by_player_changes_nobody() {
        let mut players = HashMap::new();
        players.insert(1, player(1, 2, 2));
        players.insert(2, player(2, 2, 3));
        let before = players.clone();
        let mut walls = Vec::new();

        let outcome = step(&resolver(), &mut players, &mut walls, 1, Some(Direction::Down), false);
        assert_eq!(outcome, MoveOutcome::Blocked(Position::new(2, 3)));
        assert_eq!(players, before);
    }

    #[test]
    fn test_removal_uses_last_direction() {
        let mut players = HashMap::new();
        let mut p = player(1, 3, 3);
        p.last_dir = Some(Direction::Up);
        players.insert(1, p);
        let mut walls = vec![Wall::new(Position::new(3, 2), None)];

        let outcome = step(&resolver(), &mut players, &mut walls, 1, None, true);
        assert_eq!(outcome, MoveOutcome::WallRemoved(Position::new(3, 2)));
        assert!(walls.is_empty());
        assert_eq!(players[&1].position(), Position::new(3, 3));
    }

    #[test]
    fn test_removal_prefers_supplied_direction() {
        let mut players = HashMap::new();
        let mut p = player(1, 3, 3);
        p.last_dir = Some(Direction::Up);
        players.insert(1, p);
        let mut walls = vec![
            Wall::new(Position::new(3, 2), None),
            Wall::new(Position::new(4, 3), None),
        ];

        let outcome = step(&resolver(), &mut players, &mut walls, 1, Some(Direction::Right), true);
        assert_eq!(outcome, MoveOutcome::WallRemoved(Position::new(4, 3)));
        assert_eq!(walls, vec![Wall::new(Position::new(3, 2), None)]);
    }

    #[test]
    fn test_removal_never_moves() {
        let mut players = HashMap::new();
        let mut p = player(1, 3, 3);
        p.last_dir = Some(Direction::Left);
        players.insert(1, p);
        let mut walls = Vec::new();

        let outcome = step(&resolver(), &mut players, &mut walls, 1, Some(Direction::Left), true);
        assert_eq!(outcome, MoveOutcome::RemovalMissed(Position::new(2, 3)));
        assert_eq!(players[&1].position(), Position::new(3, 3));
    }

    #[test]
    fn test_removal_out_of_bounds() {
        let mut players = HashMap::new();
        let mut p = player(1, 0, 0);
        p.last_dir = Some(Direction::Up);
        players.insert(1, p);
        let mut walls = Vec::new();

        let outcome = step(&resolver(), &mut players, &mut walls, 1, None, true);
        assert_eq!(outcome, MoveOutcome::OutOfBounds);
    }

    #[test]
    fn test_modifier_without_history_is_plain_move() {
        let mut players = HashMap::new();
        players.insert(1, player(1, 3, 3));
        let mut walls = Vec::new();

        let outcome = step(&resolver(), &mut players, &mut walls, 1, Some(Direction::Down), true);
        assert!(matches!(outcome, MoveOutcome::Moved { .. }));
        assert_eq!(players[&1].position(), Position::new(3, 4));
    }

    #[test]
    fn test_clamp_at_edge_is_noop() {
        let mut players = HashMap::new();
        players.insert(1, player(1, 0, 24));
        let mut walls = Vec::new();
        let r = resolver();

        assert_eq!(
            step(&r, &mut players, &mut walls, 1, Some(Direction::Left), false),
            MoveOutcome::OutOfBounds
        );
        assert_eq!(
            step(&r, &mut players, &mut walls, 1, Some(Direction::Down), false),
            MoveOutcome::OutOfBounds
        );
        assert_eq!(players[&1].position(), Position::new(0, 24));
        assert_eq!(players[&1].last_dir, None);
    }

    #[test]
    fn test_reject_policy_at_edge() {
        let mut players = HashMap::new();
        players.insert(1, player(1, 24, 0));
        let mut walls = Vec::new();
        let r = MovementResolver::new(BoundsPolicy::Reject, LastDirPolicy::AnyAction);

        assert_eq!(
            step(&r, &mut players, &mut walls, 1, Some(Direction::Right), false),
            MoveOutcome::OutOfBounds
        );
        assert_eq!(players[&1].position(), Position::new(24, 0));
    }

    #[test]
    fn test_missing_direction_ignored() {
        let mut players = HashMap::new();
        players.insert(1, player(1, 9, 9));
        let mut walls = Vec::new();

        assert_eq!(
            step(&resolver(), &mut players, &mut walls, 1, None, false),
            MoveOutcome::Ignored
        );
    }

    #[test]
    fn test_previous_move_policy_forgets_after_removal() {
        let mut players = HashMap::new();
        players.insert(1, player(1, 3, 3));
        let mut walls = vec![Wall::new(Position::new(3, 1), None)];
        let r = MovementResolver::new(BoundsPolicy::Clamp, LastDirPolicy::PreviousMove);

        step(&r, &mut players, &mut walls, 1, Some(Direction::Up), false);
        assert_eq!(players[&1].position(), Position::new(3, 2));

        let outcome = step(&r, &mut players, &mut walls, 1, None, true);
        assert_eq!(outcome, MoveOutcome::WallRemoved(Position::new(3, 1)));
        assert_eq!(players[&1].last_dir, None);

        // No history left, so the modifier now acts as a plain move.
        let outcome = step(&r, &mut players, &mut walls, 1, Some(Direction::Up), true);
        assert!(matches!(outcome, MoveOutcome::Moved { .. }));
    }

    #[test]
    fn test_any_action_policy_keeps_direction() {
        let mut players = HashMap::new();
        players.insert(1, player(1, 3, 3));
        let mut walls = vec![
            Wall::new(Position::new(3, 1), None),
            Wall::new(Position::new(2, 2), None),
        ];
        let r = resolver();

        step(&r, &mut players, &mut walls, 1, Some(Direction::Up), false);
        step(&r, &mut players, &mut walls, 1, None, true);
        assert_eq!(players[&1].last_dir, Some(Direction::Up));

        let outcome = step(&r, &mut players, &mut walls, 1, Some(Direction::Left), true);
        assert_eq!(outcome, MoveOutcome::WallRemoved(Position::new(2, 2)));
        assert!(walls.is_empty());
    }
}
