use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PROTOCOL_VERSION: u32 = 1;
pub const GRID_SIZE: i32 = 25;
/// Largest grid whose fully walled snapshot, plus a full roster of
/// long-named players, still fits in one datagram.
pub const MAX_GRID_SIZE: i32 = 48;
pub const DEFAULT_USERNAME: &str = "Guest";
pub const MAX_USERNAME_LEN: usize = 24;
pub const MAX_CHAT_LEN: usize = 256;

/// Large enough for a full-grid snapshot in a single datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Join {
        username: String,
    },
    Move {
        dir: Option<Direction>,
        shift: bool,
    },
    PlaceWall,
    BoomWall,
    Chat {
        message: String,
    },
    SetName {
        name: String,
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
    },
    Init {
        client_id: u32,
        grid_size: i32,
        snapshot: WorldSnapshot,
    },
    Update {
        tick: u32,
        snapshot: WorldSnapshot,
    },
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        client_id: u32,
    },
    WallAdded {
        wall: Wall,
    },
    WallRemoved {
        x: i32,
        y: i32,
    },
    ChatMessage {
        username: String,
        message: String,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dir: Direction) -> Position {
        let (dx, dy) = dir.delta();
        Position::new(self.x + dx, self.y + dy)
    }

    pub fn neighbors(self) -> [Position; 4] {
        Direction::ALL.map(|dir| self.offset(dir))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit vector in grid coordinates; y grows downwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(format!("unrecognized direction '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub color: String,
    pub username: String,
    pub last_dir: Option<Direction>,
}

impl Player {
    pub fn new(id: u32, position: Position, color: String, username: String) -> Self {
        Self {
            id,
            x: position.x,
            y: position.y,
            color,
            username,
            last_dir: None,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Position) {
        self.x = position.x;
        self.y = position.y;
    }
}

/// A wall record. Also the on-disk format of the wall snapshot, where
/// `color` may be omitted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Wall {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub color: Option<String>,
}

impl Wall {
    pub fn new(position: Position, color: Option<String>) -> Self {
        Self {
            x: position.x,
            y: position.y,
            color,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct WorldSnapshot {
    pub players: Vec<Player>,
    pub walls: Vec<Wall>,
}

impl WorldSnapshot {
    /// Every coordinate claimed by more than one occupant.
    pub fn overlapping_cells(&self) -> Vec<Position> {
        let mut seen = std::collections::HashMap::new();
        let cells = self
            .players
            .iter()
            .map(Player::position)
            .chain(self.walls.iter().map(Wall::position));
        for cell in cells {
            *seen.entry(cell).or_insert(0usize) += 1;
        }
        let mut overlaps: Vec<Position> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(cell, _)| cell)
            .collect();
        overlaps.sort_by_key(|p| (p.y, p.x));
        overlaps
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }
}
