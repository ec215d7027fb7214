//! Snapshot broadcast scheduling

use crate::config::BroadcastMode;
use crate::world::WorldState;
use shared::Packet;
use std::time::Duration;

/// Decides when a full-state `Update` goes out.
///
/// In tick mode every tick produces an update whether or not anything
/// changed, so observers converge even if earlier packets were lost. In
/// on-change mode updates follow each mutation, and ticks only flush changes
/// that were not already sent.
#[derive(Debug)]
pub struct BroadcastScheduler {
    mode: BroadcastMode,
    interval: Duration,
    tick: u32,
    dirty: bool,
}

impl BroadcastScheduler {
    pub fn new(mode: BroadcastMode, interval: Duration) -> Self {
        Self {
            mode,
            interval,
            tick: 0,
            dirty: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Advances one tick and returns the update to send, if any.
    pub fn on_tick(&mut self, world: &WorldState) -> Option<Packet> {
        self.tick = self.tick.wrapping_add(1);
        match self.mode {
            BroadcastMode::Tick => Some(self.emit(world)),
            BroadcastMode::OnChange if self.dirty => Some(self.emit(world)),
            BroadcastMode::OnChange => None,
        }
    }

    /// Called after a command has been applied.
    pub fn after_mutation(&mut self, world: &WorldState) -> Option<Packet> {
        match self.mode {
            BroadcastMode::OnChange if self.dirty => Some(self.emit(world)),
            _ => None,
        }
    }

    fn emit(&mut self, world: &WorldState) -> Packet {
        self.dirty = false;
        Packet::Update {
            tick: self.tick,
            snapshot: world.snapshot(),
        }
    }
}
