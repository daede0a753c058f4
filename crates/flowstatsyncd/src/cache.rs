//! Switch-keyed store for flow/port telemetry and rule-lifecycle tracking.
//!
//! The map itself is concurrent (one entry per switch, independent-key
//! mutation), so registration calls from the policy layer never contend
//! with polling of unrelated switches. Within an entry, telemetry sits
//! behind a read/write lock and tracking state (timeout records plus the
//! slice index) behind a mutex, and no operation ever holds two entry locks
//! at once.

use crate::timeout::{evaluate_against_snapshot, EvaluationSummary, FlowTimeout};
use crate::persist::{CacheImage, SwitchImage, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fsfw_openflow::{DatapathId, FlowMatch, FlowMod, FlowStatsEntry, PortStatsEntry};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Notifications the cache emits when a tracked rule expires.
///
/// Implemented by the policy layer so it can send flow-removed messages to
/// the slice's controller and drop the rule from the switch. Invoked after
/// the record has already been removed from tracking, outside any cache
/// lock.
pub trait ExpiryCallbacks: Send + Sync {
    /// A tracked rule's expiry condition fired and its record was removed.
    fn flow_expired(&self, dpid: DatapathId, slice: &str, timeout: &FlowTimeout);
}

/// Per-switch tracking state: timeout records and the slice index.
#[derive(Debug, Default)]
struct TrackingState {
    timeouts: Vec<FlowTimeout>,
    slice_index: HashMap<String, HashSet<FlowMatch>>,
}

/// Everything cached for one switch.
#[derive(Debug, Default)]
struct SwitchEntry {
    flow_stats: RwLock<Vec<FlowStatsEntry>>,
    port_stats: RwLock<HashMap<u16, PortStatsEntry>>,
    tracking: Mutex<TrackingState>,
}

/// The flow/port stat cache.
///
/// Telemetry (flow and port snapshots) is replaced wholesale by the poll
/// cycle and cleared when a poll fails; tracking state is owned by the
/// policy layer's registration calls and the expiry sweep, and survives
/// poll failures.
pub struct FlowStatCache {
    switches: DashMap<DatapathId, Arc<SwitchEntry>>,
    callbacks: RwLock<Option<Arc<dyn ExpiryCallbacks>>>,
}

impl fmt::Debug for FlowStatCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowStatCache")
            .field("switches", &self.switches.len())
            .finish()
    }
}

impl Default for FlowStatCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowStatCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        FlowStatCache {
            switches: DashMap::new(),
            callbacks: RwLock::new(None),
        }
    }

    /// Sets the expiry notification sink.
    pub fn set_callbacks(&self, callbacks: Arc<dyn ExpiryCallbacks>) {
        *self.callbacks.write() = Some(callbacks);
    }

    fn get_entry(&self, dpid: DatapathId) -> Option<Arc<SwitchEntry>> {
        self.switches.get(&dpid).map(|r| Arc::clone(r.value()))
    }

    fn entry_or_create(&self, dpid: DatapathId) -> Arc<SwitchEntry> {
        Arc::clone(self.switches.entry(dpid).or_default().value())
    }

    // ===== Telemetry (poll cycle writes) =====

    /// Replaces the switch's flow snapshot wholesale.
    pub fn set_flow_cache(&self, dpid: DatapathId, flow_stats: Vec<FlowStatsEntry>) {
        let entry = self.entry_or_create(dpid);
        *entry.flow_stats.write() = flow_stats;
    }

    /// Replaces the switch's port snapshot wholesale, keyed by port number.
    pub fn set_port_cache(&self, dpid: DatapathId, port_stats: Vec<PortStatsEntry>) {
        let entry = self.entry_or_create(dpid);
        let keyed: HashMap<u16, PortStatsEntry> =
            port_stats.into_iter().map(|p| (p.port_no, p)).collect();
        *entry.port_stats.write() = keyed;
    }

    /// Drops both telemetry snapshots for a switch after a failed poll.
    /// Timeout records and the slice index are policy state and stay put.
    /// Unknown switches are a no-op.
    pub fn clear_flow_cache(&self, dpid: DatapathId) {
        if let Some(entry) = self.get_entry(dpid) {
            entry.flow_stats.write().clear();
            entry.port_stats.write().clear();
            debug!(dpid = %dpid, "cleared cached telemetry");
        }
    }

    // ===== Telemetry (read API) =====

    /// Latest flow snapshot for a switch, empty if none was cached yet.
    pub fn get_switch_flow_stats(&self, dpid: DatapathId) -> Vec<FlowStatsEntry> {
        match self.get_entry(dpid) {
            Some(entry) => entry.flow_stats.read().clone(),
            None => Vec::new(),
        }
    }

    /// The subset of the latest flow snapshot owned by the named slice.
    /// Unknown switches and unknown slices yield an empty result.
    pub fn get_sliced_flow_stats(&self, dpid: DatapathId, slice: &str) -> Vec<FlowStatsEntry> {
        let Some(entry) = self.get_entry(dpid) else {
            return Vec::new();
        };
        let owned = {
            let tracking = entry.tracking.lock();
            match tracking.slice_index.get(slice) {
                Some(set) => set.clone(),
                None => return Vec::new(),
            }
        };
        let stats = entry
            .flow_stats
            .read()
            .iter()
            .filter(|stat| owned.contains(&stat.flow_match))
            .cloned()
            .collect();
        stats
    }

    /// Latest port snapshot for a switch, keyed by port number.
    pub fn get_port_stats(&self, dpid: DatapathId) -> HashMap<u16, PortStatsEntry> {
        match self.get_entry(dpid) {
            Some(entry) => entry.port_stats.read().clone(),
            None => HashMap::new(),
        }
    }

    /// Latest counters for a single port.
    pub fn get_port_stat(&self, dpid: DatapathId, port_no: u16) -> Option<PortStatsEntry> {
        self.get_entry(dpid)
            .and_then(|entry| entry.port_stats.read().get(&port_no).copied())
    }

    // ===== Registration (policy layer) =====

    /// Registers an installed rule: indexes its match (and each related
    /// flow's match) under the owning slice and creates the timeout
    /// record(s) its declared timeouts call for.
    ///
    /// Re-registering the same rule replaces its records, refreshing the
    /// installation time the way a controller reinstall does on the switch.
    pub fn add_flow_mod(
        &self,
        dpid: DatapathId,
        slice: &str,
        flow_mod: &FlowMod,
        related_flows: &[FlowMod],
        now: DateTime<Utc>,
    ) {
        let entry = self.entry_or_create(dpid);
        let mut tracking = entry.tracking.lock();

        let owned = tracking.slice_index.entry(slice.to_string()).or_default();
        owned.insert(flow_mod.flow_match);
        for related in related_flows {
            owned.insert(related.flow_match);
        }

        for record in FlowTimeout::records_for_rule(slice, flow_mod, now) {
            tracking.timeouts.retain(|r| {
                !(r.slice == record.slice
                    && r.flow_match == record.flow_match
                    && r.kind == record.kind)
            });
            tracking.timeouts.push(record);
        }
        debug!(dpid = %dpid, slice = %slice, flow = %flow_mod.flow_match, "registered flow rule");
    }

    /// Unregisters a rule: drops its timeout record(s) and removes its
    /// match (and each related flow's match) from the slice index. A rule
    /// that was never registered is a no-op.
    pub fn del_flow_mod(
        &self,
        dpid: DatapathId,
        slice: &str,
        flow_mod: &FlowMod,
        related_flows: &[FlowMod],
    ) {
        let Some(entry) = self.get_entry(dpid) else {
            return;
        };
        let mut tracking = entry.tracking.lock();

        tracking
            .timeouts
            .retain(|r| !(r.slice == slice && r.flow_match == flow_mod.flow_match));

        let now_empty = tracking
            .slice_index
            .get_mut(slice)
            .map(|owned| {
                owned.remove(&flow_mod.flow_match);
                for related in related_flows {
                    owned.remove(&related.flow_match);
                }
                owned.is_empty()
            })
            .unwrap_or(false);
        if now_empty {
            tracking.slice_index.remove(slice);
        }
        debug!(dpid = %dpid, slice = %slice, flow = %flow_mod.flow_match, "unregistered flow rule");
    }

    // ===== Expiry tracking (poll cycle) =====

    /// Every tracked record for a switch, each a candidate for expiry
    /// evaluation this cycle.
    pub fn get_possible_expired_flows(&self, dpid: DatapathId) -> Vec<FlowTimeout> {
        match self.get_entry(dpid) {
            Some(entry) => entry.tracking.lock().timeouts.clone(),
            None => Vec::new(),
        }
    }

    /// Applies the just-fetched flow snapshot to the switch's idle records.
    /// Only meaningful after a successful poll; a failed poll must clear
    /// telemetry instead so tracked rules are not mass-marked as vanished.
    pub fn update_flow_timeouts(&self, dpid: DatapathId, now: DateTime<Utc>) -> EvaluationSummary {
        let Some(entry) = self.get_entry(dpid) else {
            return EvaluationSummary::default();
        };
        let snapshot = entry.flow_stats.read().clone();
        let mut tracking = entry.tracking.lock();
        evaluate_against_snapshot(&mut tracking.timeouts, &snapshot, now)
    }

    /// Sweeps the switch's records, removing every one whose expiry
    /// condition holds at `now`, pruning the slice index, and notifying the
    /// expiry callbacks. Returns the removed records.
    pub fn check_expire_flows(&self, dpid: DatapathId, now: DateTime<Utc>) -> Vec<FlowTimeout> {
        let Some(entry) = self.get_entry(dpid) else {
            return Vec::new();
        };

        let expired = {
            let mut tracking = entry.tracking.lock();
            let records = std::mem::take(&mut tracking.timeouts);
            let (expired, kept): (Vec<FlowTimeout>, Vec<FlowTimeout>) =
                records.into_iter().partition(|r| r.is_expired(now));
            tracking.timeouts = kept;

            for record in &expired {
                // A sibling record (the other timeout kind of the same
                // rule) keeps the match attributed until it too is gone.
                let still_tracked = tracking
                    .timeouts
                    .iter()
                    .any(|r| r.slice == record.slice && r.flow_match == record.flow_match);
                if still_tracked {
                    continue;
                }
                let now_empty = tracking
                    .slice_index
                    .get_mut(&record.slice)
                    .map(|owned| {
                        owned.remove(&record.flow_match);
                        owned.is_empty()
                    })
                    .unwrap_or(false);
                if now_empty {
                    tracking.slice_index.remove(&record.slice);
                }
            }
            expired
        };

        if !expired.is_empty() {
            let callbacks = self.callbacks.read().clone();
            for record in &expired {
                debug!(
                    dpid = %dpid,
                    slice = %record.slice,
                    kind = ?record.kind,
                    flow = %record.flow_match,
                    "flow rule expired"
                );
                if let Some(cb) = &callbacks {
                    cb.flow_expired(dpid, &record.slice, record);
                }
            }
        }
        expired
    }

    // ===== Inventory and persistence bridge =====

    /// Datapath ids of every switch the cache holds an entry for, sorted.
    pub fn switches(&self) -> Vec<DatapathId> {
        let mut dpids: Vec<DatapathId> = self.switches.iter().map(|r| *r.key()).collect();
        dpids.sort();
        dpids
    }

    /// Number of switch entries.
    pub fn len(&self) -> usize {
        self.switches.len()
    }

    /// True if no switch entries exist.
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Serializable image of the whole cache.
    pub fn snapshot(&self, now: DateTime<Utc>) -> CacheImage {
        let mut entries: Vec<(DatapathId, Arc<SwitchEntry>)> = self
            .switches
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        entries.sort_by_key(|(dpid, _)| *dpid);

        let switches = entries
            .into_iter()
            .map(|(dpid, entry)| {
                let flow_stats = entry.flow_stats.read().clone();
                let mut port_stats: Vec<PortStatsEntry> =
                    entry.port_stats.read().values().copied().collect();
                port_stats.sort_by_key(|p| p.port_no);
                let tracking = entry.tracking.lock();
                SwitchImage {
                    dpid,
                    flow_stats,
                    port_stats,
                    timeouts: tracking.timeouts.clone(),
                    slice_index: tracking.slice_index.clone(),
                }
            })
            .collect();

        CacheImage {
            schema_version: SCHEMA_VERSION,
            saved_at: now,
            switches,
        }
    }

    /// Replaces the cache contents with a previously persisted image.
    pub fn restore(&self, image: CacheImage) {
        self.switches.clear();
        for sw in image.switches {
            let entry = SwitchEntry {
                flow_stats: RwLock::new(sw.flow_stats),
                port_stats: RwLock::new(
                    sw.port_stats.into_iter().map(|p| (p.port_no, p)).collect(),
                ),
                tracking: Mutex::new(TrackingState {
                    timeouts: sw.timeouts,
                    slice_index: sw.slice_index,
                }),
            };
            self.switches.insert(sw.dpid, Arc::new(entry));
        }
    }
}
