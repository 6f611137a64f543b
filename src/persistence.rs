use crate::cache::TtlCache;
use crate::geocode::LatLon;
use compact_str::CompactString;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const GEOCODES_FILE: &str = "geocodes.bin";

#[derive(Debug, Serialize, Deserialize)]
struct SavedGeocode {
    address: CompactString,
    point: LatLon,
    expires_at: i64,
}

/// Writes live geocode entries to `{dir}/geocodes.bin`.
pub fn save_geocodes(cache: &TtlCache<CompactString, LatLon>, dir: &str) -> Result<usize> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir))?;

    let saved: Vec<SavedGeocode> = cache
        .snapshot()
        .into_iter()
        .map(|(address, entry)| SavedGeocode {
            address,
            point: entry.value,
            expires_at: entry.expires_at.timestamp(),
        })
        .collect();

    // Temp file then rename, readers never see a partial snapshot
    let path = Path::new(dir).join(GEOCODES_FILE);
    let tmp = Path::new(dir).join(format!("{}.tmp", GEOCODES_FILE));
    let mut f = BufWriter::new(File::create(&tmp)?);
    bincode::serialize_into(&mut f, &saved)?;
    f.flush()?;
    std::fs::rename(&tmp, &path)?;

    Ok(saved.len())
}

/// Restores entries that have not expired yet.
pub fn load_geocodes(cache: &TtlCache<CompactString, LatLon>, dir: &str) -> Result<usize> {
    let path = Path::new(dir).join(GEOCODES_FILE);
    if !path.exists() {
        return Ok(0);
    }

    let f = File::open(&path)?;
    let saved: Vec<SavedGeocode> = bincode::deserialize_from(f)
        .with_context(|| format!("decoding {}", path.display()))?;

    let before = cache.len();
    for s in saved {
        if let Some(expires_at) = DateTime::<Utc>::from_timestamp(s.expires_at, 0) {
            cache.put_until(s.address, s.point, expires_at);
        }
    }
    let loaded = cache.len() - before;
    info!(loaded, "Loaded geocodes from disk");
    Ok(loaded)
}
