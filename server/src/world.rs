//! Authoritative world state
//!
//! `WorldState` is the only owner of the player map and the wall list, and
//! the only place they are mutated. Inbound client actions arrive as
//! [`Command`]s and come back out as [`WorldEvent`]s describing what changed;
//! actions that change nothing (unknown player, blocked move, duplicate wall)
//! produce no events and are otherwise silent.

use crate::config::{BoundsPolicy, LastDirPolicy, ServerConfig};
use crate::grid::GridIndex;
use crate::movement::{MoveOutcome, MovementResolver};
use crate::spawn::{find_spawn, random_color};
use crate::walls;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    Direction, Player, Position, Wall, WorldSnapshot, DEFAULT_USERNAME, GRID_SIZE,
    MAX_USERNAME_LEN,
};
use std::collections::HashMap;

/// Named actions a connected client can take on the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { username: String },
    Move { dir: Option<Direction>, shift: bool },
    PlaceWall,
    BoomWall,
    SetName { name: String },
    Leave,
}

/// Observable effect of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    PlayerJoined(Player),
    PlayerLeft(u32),
    PlayerMoved { id: u32, from: Position, to: Position },
    PlayerRenamed { id: u32, username: String },
    WallAdded(Wall),
    WallRemoved(Position),
}

impl WorldEvent {
    /// Whether the event changes the persisted wall set.
    pub fn touches_walls(&self) -> bool {
        matches!(self, WorldEvent::WallAdded(_) | WorldEvent::WallRemoved(_))
    }
}

pub struct WorldState {
    grid_size: i32,
    players: HashMap<u32, Player>,
    walls: Vec<Wall>,
    resolver: MovementResolver,
    rng: StdRng,
}

impl WorldState {
    pub fn new(grid_size: i32, resolver: MovementResolver, rng: StdRng) -> Self {
        Self {
            grid_size,
            players: HashMap::new(),
            walls: Vec::new(),
            resolver,
            rng,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(
            config.grid_size,
            MovementResolver::new(config.bounds, config.last_dir),
            rng,
        )
    }

    /// Seeds the wall set, skipping out-of-bounds and duplicate records.
    pub fn load_walls(&mut self, walls: Vec<Wall>) -> usize {
        let mut loaded = 0;
        for wall in walls {
            let pos = wall.position();
            if !self.grid().contains(pos) || self.grid().wall_at(pos).is_some() {
                warn!("Skipping invalid wall record at {}", pos);
                continue;
            }
            self.walls.push(wall);
            loaded += 1;
        }
        loaded
    }

    pub fn grid_size(&self) -> i32 {
        self.grid_size
    }

    pub fn grid(&self) -> GridIndex<'_> {
        GridIndex::new(self.grid_size, &self.players, &self.walls)
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn username_of(&self, id: u32) -> Option<String> {
        self.players.get(&id).map(|p| p.username.clone())
    }

    /// Deep point-in-time copy; players are ordered by id.
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by_key(|p| p.id);
        WorldSnapshot {
            players,
            walls: self.walls.clone(),
        }
    }

    /// Routes a client command to the matching operation.
    pub fn execute(&mut self, id: u32, command: Command) -> Vec<WorldEvent> {
        match command {
            Command::Join { username } => {
                if self.players.contains_key(&id) {
                    debug!("Ignoring repeated join from client {}", id);
                    return Vec::new();
                }
                vec![WorldEvent::PlayerJoined(self.add_player(id, &username))]
            }
            Command::Move { dir, shift } => match self.move_player(id, dir, shift) {
                MoveOutcome::Moved { from, to, .. } => {
                    vec![WorldEvent::PlayerMoved { id, from, to }]
                }
                MoveOutcome::WallRemoved(pos) => vec![WorldEvent::WallRemoved(pos)],
                _ => Vec::new(),
            },
            Command::PlaceWall => self
                .place_wall(id)
                .map(WorldEvent::WallAdded)
                .into_iter()
                .collect(),
            Command::BoomWall => self.boom_wall(id),
            Command::SetName { name } => self
                .set_username(id, &name)
                .map(|username| WorldEvent::PlayerRenamed { id, username })
                .into_iter()
                .collect(),
            Command::Leave => self
                .remove_player(id)
                .map(|p| WorldEvent::PlayerLeft(p.id))
                .into_iter()
                .collect(),
        }
    }

    /// Spawns a player on a free cell with a fresh color.
    pub fn add_player(&mut self, id: u32, username: &str) -> Player {
        let grid_size = self.grid_size;
        let spawn = {
            let grid = GridIndex::new(grid_size, &self.players, &self.walls);
            find_spawn(&mut self.rng, grid_size, |p| grid.is_occupied(p.x, p.y))
        };
        let color = random_color(&mut self.rng);
        let player = Player::new(id, spawn, color, normalize_username(username));

        info!(
            "Player {} ({}) spawned at {} with color {}",
            player.username, id, spawn, player.color
        );
        self.players.insert(id, player.clone());
        player
    }

    pub fn remove_player(&mut self, id: u32) -> Option<Player> {
        let removed = self.players.remove(&id);
        if let Some(player) = &removed {
            info!("Player {} ({}) left", player.username, id);
        }
        removed
    }

    pub fn move_player(&mut self, id: u32, dir: Option<Direction>, removal: bool) -> MoveOutcome {
        let outcome = match self.players.get(&id) {
            Some(player) => self.resolver.resolve(player, dir, removal, &self.grid()),
            None => return MoveOutcome::Ignored,
        };

        if let Some(player) = self.players.get_mut(&id) {
            self.resolver.apply(outcome, player, &mut self.walls);
        }
        debug!("Move {:?} (shift={}) by {}: {:?}", dir, removal, id, outcome);
        outcome
    }

    /// Removes the wall adjacent to the player, as a move with the modifier held.
    pub fn remove_wall_near(&mut self, id: u32, dir: Option<Direction>) -> bool {
        matches!(self.move_player(id, dir, true), MoveOutcome::WallRemoved(_))
    }

    /// Returns the new username, or `None` if the player is unknown.
    pub fn set_username(&mut self, id: u32, name: &str) -> Option<String> {
        let player = self.players.get_mut(&id)?;
        player.username = normalize_username(name);
        Some(player.username.clone())
    }

    pub fn place_wall(&mut self, id: u32) -> Option<Wall> {
        let player = self.players.get_mut(&id)?;
        self.resolver.forget_direction(player);
        if walls::place(&mut self.walls, player) {
            self.walls.last().cloned()
        } else {
            None
        }
    }

    pub fn boom_wall(&mut self, id: u32) -> Vec<WorldEvent> {
        let Some(player) = self.players.get_mut(&id) else {
            return Vec::new();
        };
        self.resolver.forget_direction(player);

        let Some((wall, displaced)) = walls::detonate(
            &mut self.rng,
            self.grid_size,
            &mut self.players,
            &mut self.walls,
            id,
        ) else {
            return Vec::new();
        };

        let mut events: Vec<WorldEvent> = displaced
            .into_iter()
            .map(|d| WorldEvent::PlayerMoved {
                id: d.player_id,
                from: d.from,
                to: d.to,
            })
            .collect();
        events.push(WorldEvent::WallAdded(wall));
        events
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(
            GRID_SIZE,
            MovementResolver::new(BoundsPolicy::Clamp, LastDirPolicy::AnyAction),
            StdRng::from_entropy(),
        )
    }
}

/// Trims and caps a display name, substituting the placeholder when empty.
pub fn normalize_username(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_USERNAME.to_string()
    } else {
        trimmed.chars().take(MAX_USERNAME_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> WorldState {
        WorldState::new(
            25,
            MovementResolver::new(BoundsPolicy::Clamp, LastDirPolicy::AnyAction),
            StdRng::seed_from_u64(42),
        )
    }

    /// Adds a player and teleports it to `pos` for scenario setup.
    fn place_player(world: &mut WorldState, id: u32, pos: Position) {
        world.add_player(id, &format!("p{}", id));
        world.players.get_mut(&id).unwrap().set_position(pos);
    }

    #[test]
    fn test_join_spawns_distinct_cells() {
        let mut world = world();
        for id in 1..=50 {
            world.execute(
                id,
                Command::Join {
                    username: format!("p{}", id),
                },
            );
        }
        assert_eq!(world.player_count(), 50);
        assert!(world.snapshot().overlapping_cells().is_empty());
    }

    #[test]
    fn test_join_never_lands_on_existing_player() {
        for seed in 0..20 {
            let mut world = WorldState::new(
                25,
                MovementResolver::new(BoundsPolicy::Clamp, LastDirPolicy::AnyAction),
                StdRng::seed_from_u64(seed),
            );
            let a = world.add_player(1, "a");
            let b = world.add_player(2, "b");
            assert_ne!(a.position(), b.position());
        }
    }

    #[test]
    fn test_join_avoids_walls() {
        let mut world = WorldState::new(
            3,
            MovementResolver::new(BoundsPolicy::Clamp, LastDirPolicy::AnyAction),
            StdRng::seed_from_u64(1),
        );
        let walls = (0..3)
            .flat_map(|x| (0..3).map(move |y| Wall::new(Position::new(x, y), None)))
            .filter(|w| w.position() != Position::new(2, 1))
            .collect();
        world.load_walls(walls);

        let player = world.add_player(1, "solo");
        assert_eq!(player.position(), Position::new(2, 1));
    }

    #[test]
    fn test_duplicate_join_ignored() {
        let mut world = world();
        let first = world.execute(1, Command::Join { username: "a".into() });
        let second = world.execute(1, Command::Join { username: "b".into() });

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(world.username_of(1).as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_username_gets_placeholder() {
        let mut world = world();
        let player = world.add_player(1, "   ");
        assert_eq!(player.username, DEFAULT_USERNAME);

        let long = "n".repeat(MAX_USERNAME_LEN * 2);
        assert_eq!(normalize_username(&long).len(), MAX_USERNAME_LEN);
    }

    #[test]
    fn test_move_scenario() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(5, 5));

        let events = world.execute(
            1,
            Command::Move {
                dir: Some(Direction::Right),
                shift: false,
            },
        );
        assert_eq!(
            events,
            vec![WorldEvent::PlayerMoved {
                id: 1,
                from: Position::new(5, 5),
                to: Position::new(6, 5),
            }]
        );

        world.load_walls(vec![Wall::new(Position::new(7, 5), None)]);
        let events = world.execute(
            1,
            Command::Move {
                dir: Some(Direction::Right),
                shift: false,
            },
        );
        assert!(events.is_empty());
        assert_eq!(world.player(1).unwrap().position(), Position::new(6, 5));
    }

    #[test]
    fn test_removal_scenario() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(3, 3));
        world.players.get_mut(&1).unwrap().last_dir = Some(Direction::Up);
        world.load_walls(vec![Wall::new(Position::new(3, 2), None)]);

        let events = world.execute(
            1,
            Command::Move {
                dir: None,
                shift: true,
            },
        );
        assert_eq!(events, vec![WorldEvent::WallRemoved(Position::new(3, 2))]);
        assert!(world.walls().is_empty());
        assert_eq!(world.player(1).unwrap().position(), Position::new(3, 3));
    }

    #[test]
    fn test_remove_wall_near() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(3, 3));
        world.players.get_mut(&1).unwrap().last_dir = Some(Direction::Down);
        world.load_walls(vec![Wall::new(Position::new(2, 3), None)]);

        assert!(!world.remove_wall_near(1, None));
        assert!(world.remove_wall_near(1, Some(Direction::Left)));
        assert!(world.walls().is_empty());
    }

    #[test]
    fn test_place_wall_twice_creates_one() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(8, 8));

        assert_eq!(world.execute(1, Command::PlaceWall).len(), 1);
        assert!(world.execute(1, Command::PlaceWall).is_empty());
        assert_eq!(world.walls().len(), 1);
        assert_eq!(
            world.walls()[0].color.as_deref(),
            Some(world.player(1).unwrap().color.as_str())
        );
    }

    #[test]
    fn test_place_then_remove_restores_occupancy() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(8, 8));
        place_player(&mut world, 2, Position::new(15, 15));
        let before = world.snapshot();

        world.execute(1, Command::PlaceWall);
        assert!(world.grid().wall_at(Position::new(8, 8)).is_some());

        assert!(walls::remove(&mut world.walls, Position::new(8, 8)));
        assert_eq!(world.snapshot(), before);
    }

    #[test]
    fn test_placer_can_leave_but_not_return() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(8, 8));
        world.execute(1, Command::PlaceWall);

        let moved = world.execute(
            1,
            Command::Move {
                dir: Some(Direction::Up),
                shift: false,
            },
        );
        assert_eq!(moved.len(), 1);
        assert!(world.snapshot().overlapping_cells().is_empty());

        let back = world.execute(
            1,
            Command::Move {
                dir: Some(Direction::Down),
                shift: false,
            },
        );
        assert!(back.is_empty());
        assert_eq!(world.player(1).unwrap().position(), Position::new(8, 7));
    }

    #[test]
    fn test_boom_displaces_and_walls_cell() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(10, 10));

        let events = world.execute(1, Command::BoomWall);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], WorldEvent::PlayerMoved { id: 1, .. }));
        assert!(matches!(events[1], WorldEvent::WallAdded(_)));
        assert!(world.grid().wall_at(Position::new(10, 10)).is_some());
        assert!(world.snapshot().overlapping_cells().is_empty());
    }

    #[test]
    fn test_set_name() {
        let mut world = world();
        world.add_player(1, "old");

        let events = world.execute(1, Command::SetName { name: " new ".into() });
        assert_eq!(
            events,
            vec![WorldEvent::PlayerRenamed {
                id: 1,
                username: "new".into()
            }]
        );
        assert!(world.execute(9, Command::SetName { name: "x".into() }).is_empty());
    }

    #[test]
    fn test_unknown_player_commands_are_noops() {
        let mut world = world();
        let commands = vec![
            Command::Move {
                dir: Some(Direction::Up),
                shift: false,
            },
            Command::PlaceWall,
            Command::BoomWall,
            Command::Leave,
        ];
        for command in commands {
            assert!(world.execute(99, command).is_empty());
        }
        assert!(world.walls().is_empty());
    }

    #[test]
    fn test_leave_frees_cell_and_is_idempotent() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(4, 4));
        place_player(&mut world, 2, Position::new(5, 4));

        assert_eq!(world.execute(1, Command::Leave), vec![WorldEvent::PlayerLeft(1)]);
        assert!(world.execute(1, Command::Leave).is_empty());

        let events = world.execute(
            2,
            Command::Move {
                dir: Some(Direction::Left),
                shift: false,
            },
        );
        assert_eq!(events.len(), 1);
        assert_eq!(world.player(2).unwrap().position(), Position::new(4, 4));
    }

    #[test]
    fn test_load_walls_skips_invalid_records() {
        let mut world = world();
        let loaded = world.load_walls(vec![
            Wall::new(Position::new(1, 1), None),
            Wall::new(Position::new(1, 1), Some("#ffffff".into())),
            Wall::new(Position::new(-1, 3), None),
            Wall::new(Position::new(3, 25), None),
        ]);
        assert_eq!(loaded, 1);
        assert_eq!(world.walls().len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut world = world();
        place_player(&mut world, 1, Position::new(2, 2));
        let snapshot = world.snapshot();

        world.execute(
            1,
            Command::Move {
                dir: Some(Direction::Down),
                shift: false,
            },
        );
        assert_eq!(snapshot.player(1).unwrap().position(), Position::new(2, 2));
        assert_eq!(world.snapshot().player(1).unwrap().position(), Position::new(2, 3));
    }

    #[test]
    fn test_random_walk_keeps_invariants() {
        let mut world = world();
        for id in 1..=6 {
            world.add_player(id, "walker");
        }

        let mut rng = StdRng::seed_from_u64(9);
        for step in 0..2000u32 {
            let id = rand::Rng::gen_range(&mut rng, 1..=6);
            let dir = Direction::ALL[rand::Rng::gen_range(&mut rng, 0..4)];
            let command = match step % 7 {
                0 => Command::PlaceWall,
                1 => Command::Move {
                    dir: Some(dir),
                    shift: true,
                },
                _ => Command::Move {
                    dir: Some(dir),
                    shift: false,
                },
            };
            world.execute(id, command);

            let snapshot = world.snapshot();
            for player in &snapshot.players {
                assert!(world.grid().contains(player.position()));
            }
            // A placer may stand on its own fresh wall; nothing else overlaps.
            for cell in snapshot.overlapping_cells() {
                let players_here = snapshot.players.iter().filter(|p| p.position() == cell).count();
                let walls_here = snapshot.walls.iter().filter(|w| w.position() == cell).count();
                assert_eq!((players_here, walls_here), (1, 1));
            }
        }
    }
}
