//! # Grid Sandbox Server Library
//!
//! This library provides the authoritative server for a shared grid sandbox.
//! Players walk a square grid, drop and clear walls, detonate walls to scatter
//! whoever stands next to them, and chat through a profanity filter. Every
//! decision is made here; clients only send intents and render snapshots.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World
//! A single [`world::WorldState`] owns the player map and the wall list. All
//! client actions are routed through it as commands, and it answers with the
//! events they caused. No other component mutates world data.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Connection establishment and id assignment
//! - Joining the world under a display name
//! - Disconnection and timeout cleanup
//!
//! ### State Broadcasting
//! Full snapshots go out on a fixed tick (or after each change, depending on
//! the configured mode), so observers converge even if earlier packets were
//! lost. Joins, leaves and wall edits additionally get small notification
//! packets.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! The server processes network events, filtered chat and broadcast ticks
//! sequentially in one loop. World mutations are therefore totally ordered and
//! never interleave. Chat filtering is the only slow operation and runs in
//! per-sender background lanes that report back to the loop.
//!
//! ### UDP-Based Communication
//! Uses UDP sockets with bincode-encoded [`shared::Packet`]s. A full snapshot
//! of the default grid fits in one datagram.
//!
//! ## Module Organization
//!
//! - `grid`: read-only occupancy queries over players and walls
//! - `spawn`: random free-cell selection and player colors
//! - `movement`: single-step moves and wall removal
//! - `walls`: wall placement, removal and detonation
//! - `chat`: filtering pipeline with per-sender ordering
//! - `world`: the authoritative state and command dispatch
//! - `broadcast`: when snapshot updates go out
//! - `persistence`: the wall snapshot file
//! - `client_manager`: connection tracking and timeouts
//! - `network`: socket tasks and the main loop
//! - `config`: command line configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::parse();
//!
//!     // Binds the socket, loads walls and builds the chat filter
//!     let mut server = Server::new(&config).await?;
//!
//!     // Runs until Ctrl+C:
//!     // - Accepts connections and joins
//!     // - Applies moves and wall edits in arrival order
//!     // - Broadcasts snapshots at the configured tick rate
//!     // - Drops clients that go silent
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod chat;
pub mod client_manager;
pub mod config;
pub mod grid;
pub mod movement;
pub mod network;
pub mod persistence;
pub mod spawn;
pub mod walls;
pub mod world;
