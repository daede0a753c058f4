//! Cache image persistence.
//!
//! The whole cache is written as one JSON document after every poll cycle
//! and read back once at startup, so a daemon restart does not reset idle
//! tracking for rules that are already partway to expiry. Writes go through
//! a temp file in the target directory followed by a rename, which keeps a
//! crash mid-write from truncating the previous image.

use crate::error::{FlowStatError, Result};
use crate::timeout::FlowTimeout;
use chrono::{DateTime, Utc};
use fsfw_openflow::{DatapathId, FlowMatch, FlowStatsEntry, PortStatsEntry};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Version stamp written into every image. Bumped when the on-disk layout
/// changes; a mismatch on load is treated the same as a corrupt file.
pub const SCHEMA_VERSION: u32 = 1;

/// Serializable image of one switch's cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchImage {
    /// Datapath id of the switch.
    pub dpid: DatapathId,
    /// Flow snapshot at save time.
    pub flow_stats: Vec<FlowStatsEntry>,
    /// Port snapshot at save time, stored as a list since JSON object keys
    /// must be strings.
    pub port_stats: Vec<PortStatsEntry>,
    /// Tracked timeout records.
    pub timeouts: Vec<FlowTimeout>,
    /// Match ownership per slice.
    pub slice_index: HashMap<String, HashSet<FlowMatch>>,
}

/// Serializable image of the whole cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheImage {
    /// On-disk layout version, [`SCHEMA_VERSION`] when written by this
    /// build.
    pub schema_version: u32,
    /// When the image was taken.
    pub saved_at: DateTime<Utc>,
    /// Per-switch entries, sorted by datapath id.
    pub switches: Vec<SwitchImage>,
}

/// Writes the image to `path` atomically.
///
/// The parent directory is created if missing. The document lands in a
/// `.tmp` sibling first and is renamed over the target, so readers only
/// ever see a complete image.
pub fn save_atomic(image: &CacheImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        FlowStatError::Persistence(format!("cache path {} has no file name", path.display()))
    })?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let body = serde_json::to_vec_pretty(image)
        .map_err(|e| FlowStatError::Persistence(format!("encode cache image: {e}")))?;
    fs::write(&tmp_path, body)?;
    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), switches = image.switches.len(), "persisted cache image");
    Ok(())
}

/// Reads a previously saved image from `path`.
///
/// A missing file is the normal cold-start case and yields `Ok(None)`.
/// Unparseable content or an unknown schema version is an error; the caller
/// decides whether to start cold anyway.
pub fn load(path: &Path) -> Result<Option<CacheImage>> {
    let body = match fs::read(path) {
        Ok(body) => body,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let image: CacheImage = serde_json::from_slice(&body)
        .map_err(|e| FlowStatError::CacheFormat(format!("{}: {e}", path.display())))?;
    if image.schema_version != SCHEMA_VERSION {
        return Err(FlowStatError::CacheFormat(format!(
            "unsupported cache schema version {} in {}",
            image.schema_version,
            path.display()
        )));
    }
    Ok(Some(image))
}
