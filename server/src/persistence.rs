//! Wall snapshot file
//!
//! The snapshot is a JSON array of `{x, y}` or `{x, y, color}` records. A
//! missing or unreadable file never blocks startup; the server simply starts
//! with no walls.

use log::{info, warn};
use shared::Wall;
use std::error::Error;
use std::fs;
use std::path::Path;

pub fn load_walls(path: &Path) -> Vec<Wall> {
    match try_load(path) {
        Ok(walls) => {
            info!("Loaded {} walls from {}", walls.len(), path.display());
            walls
        }
        Err(e) => {
            warn!(
                "No usable wall snapshot at {} ({}), starting with empty walls",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}

fn try_load(path: &Path) -> Result<Vec<Wall>, Box<dyn Error>> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Writes the snapshot through a temporary file so readers never see a
/// half-written array.
pub fn save_walls(path: &Path, walls: &[Wall]) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(walls)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
