//! Flow-rule lifecycle records and idle/hard expiry evaluation.
//!
//! The policy layer rewrites rule timeouts before they reach the switch, so
//! this daemon is the component that decides when a rule has idled out or
//! outlived its hard deadline. Soft expiry is inferred from packet counters:
//! a counter that does not move between two polls means no traffic matched
//! the rule in between.

use chrono::{DateTime, Duration, Utc};
use fsfw_openflow::{FlowMatch, FlowMod, FlowStatsEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of expiry a tracked record enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    /// Expire after a period with no counter change.
    Idle,
    /// Expire a fixed time after installation, regardless of activity.
    Hard,
}

impl TimeoutKind {
    /// Returns true for [`TimeoutKind::Hard`].
    pub fn is_hard(&self) -> bool {
        matches!(self, TimeoutKind::Hard)
    }
}

/// A tracked flow-rule lifecycle record.
///
/// Created when the policy layer registers a rule, mutated by
/// [`evaluate_against_snapshot`] each poll cycle, and destroyed by the
/// expiry sweep or by explicit unregistration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTimeout {
    /// Match criteria of the owning rule.
    pub flow_match: FlowMatch,
    /// Name of the slice that owns the rule.
    pub slice: String,
    /// Which expiry condition applies.
    pub kind: TimeoutKind,
    /// Configured lifetime or idle threshold, in seconds.
    pub duration_secs: u16,
    /// When the rule was registered.
    pub installed_at: DateTime<Utc>,
    /// Packet counter observed at the last change.
    pub last_packet_count: u64,
    /// When the counter last changed (or installation time).
    pub last_used: DateTime<Utc>,
    /// Set when the rule disappeared from a live snapshot.
    pub vanished: bool,
}

impl FlowTimeout {
    /// Creates a record for a freshly registered rule.
    pub fn new(
        flow_match: FlowMatch,
        slice: impl Into<String>,
        kind: TimeoutKind,
        duration_secs: u16,
        now: DateTime<Utc>,
    ) -> Self {
        FlowTimeout {
            flow_match,
            slice: slice.into(),
            kind,
            duration_secs,
            installed_at: now,
            last_packet_count: 0,
            last_used: now,
            vanished: false,
        }
    }

    /// Builds the records a rule's declared timeouts call for: one hard
    /// record for a nonzero hard timeout, one idle record for a nonzero
    /// idle timeout, none for a permanent rule.
    pub fn records_for_rule(
        slice: &str,
        flow_mod: &FlowMod,
        now: DateTime<Utc>,
    ) -> Vec<FlowTimeout> {
        let mut records = Vec::new();
        if flow_mod.hard_timeout > 0 {
            records.push(FlowTimeout::new(
                flow_mod.flow_match,
                slice,
                TimeoutKind::Hard,
                flow_mod.hard_timeout,
                now,
            ));
        }
        if flow_mod.idle_timeout > 0 {
            records.push(FlowTimeout::new(
                flow_mod.flow_match,
                slice,
                TimeoutKind::Idle,
                flow_mod.idle_timeout,
                now,
            ));
        }
        records
    }

    /// Folds a freshly polled packet counter into the record.
    ///
    /// An unchanged counter means the rule has been idle since the last
    /// observation and the record is left alone, so idle time accrues from
    /// the unchanged `last_used`. A changed counter records the new value
    /// and refreshes `last_used` to `now`. Returns true if the record was
    /// refreshed.
    pub fn observe(&mut self, packet_count: u64, now: DateTime<Utc>) -> bool {
        if packet_count == self.last_packet_count {
            return false;
        }
        self.last_packet_count = packet_count;
        self.last_used = now;
        true
    }

    /// Marks the rule as gone from the switch's live flow table. The record
    /// becomes an immediate expiry candidate.
    pub fn mark_vanished(&mut self) {
        self.vanished = true;
    }

    /// Returns true once the record's expiry condition holds at `now`.
    /// Boundaries are inclusive: a rule is expired the instant its elapsed
    /// or idle time reaches the configured duration.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let limit = Duration::seconds(i64::from(self.duration_secs));
        match self.kind {
            TimeoutKind::Hard => now - self.installed_at >= limit,
            TimeoutKind::Idle => self.vanished || now - self.last_used >= limit,
        }
    }
}

/// Counts of what one evaluation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    /// Records whose counter changed and whose last-used time was refreshed.
    pub refreshed: usize,
    /// Records found in the snapshot with an unchanged counter.
    pub idle: usize,
    /// Records whose rule was missing from the snapshot.
    pub vanished: usize,
}

/// Applies one poll cycle's flow snapshot to every tracked idle record.
///
/// Hard records are never touched here; their deadline is independent of
/// counter activity. For each idle record the matching snapshot entry is
/// located by exact match-criteria equality:
/// found-and-unchanged leaves the record alone, found-and-changed refreshes
/// it, missing marks it vanished.
pub fn evaluate_against_snapshot(
    records: &mut [FlowTimeout],
    snapshot: &[FlowStatsEntry],
    now: DateTime<Utc>,
) -> EvaluationSummary {
    let counters: HashMap<&FlowMatch, u64> = snapshot
        .iter()
        .map(|entry| (&entry.flow_match, entry.packet_count))
        .collect();

    let mut summary = EvaluationSummary::default();
    for record in records.iter_mut().filter(|r| !r.kind.is_hard()) {
        match counters.get(&record.flow_match) {
            Some(&count) => {
                if record.observe(count, now) {
                    summary.refreshed += 1;
                } else {
                    summary.idle += 1;
                }
            }
            None => {
                record.mark_vanished();
                summary.vanished += 1;
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fsfw_openflow::wildcards;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn vlan_match(vlan: u16) -> FlowMatch {
        FlowMatch {
            wildcards: wildcards::ALL & !wildcards::DL_VLAN,
            dl_vlan: vlan,
            ..FlowMatch::any()
        }
    }

    fn snapshot_entry(flow_match: FlowMatch, packets: u64) -> FlowStatsEntry {
        FlowStatsEntry {
            packet_count: packets,
            ..FlowStatsEntry::new(flow_match)
        }
    }

    // ===== 1. Record Creation Tests =====

    #[test]
    fn test_records_for_permanent_rule() {
        let rule = FlowMod::new(vlan_match(1));
        assert!(FlowTimeout::records_for_rule("edge", &rule, t0()).is_empty());
    }

    #[test]
    fn test_records_for_idle_rule() {
        let rule = FlowMod {
            idle_timeout: 60,
            ..FlowMod::new(vlan_match(1))
        };
        let records = FlowTimeout::records_for_rule("edge", &rule, t0());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, TimeoutKind::Idle);
        assert_eq!(records[0].duration_secs, 60);
        assert_eq!(records[0].last_used, t0());
        assert_eq!(records[0].last_packet_count, 0);
    }

    #[test]
    fn test_records_for_dual_timeout_rule() {
        let rule = FlowMod {
            idle_timeout: 60,
            hard_timeout: 300,
            ..FlowMod::new(vlan_match(1))
        };
        let records = FlowTimeout::records_for_rule("edge", &rule, t0());
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.kind == TimeoutKind::Hard));
        assert!(records.iter().any(|r| r.kind == TimeoutKind::Idle));
    }

    // ===== 2. Counter Observation Tests =====

    #[test]
    fn test_observe_unchanged_counter_keeps_last_used() {
        let mut record = FlowTimeout::new(vlan_match(1), "edge", TimeoutKind::Idle, 60, t0());
        let later = t0() + Duration::seconds(30);
        assert!(!record.observe(0, later));
        assert_eq!(record.last_used, t0());
        assert_eq!(record.last_packet_count, 0);
    }

    #[test]
    fn test_observe_changed_counter_refreshes() {
        let mut record = FlowTimeout::new(vlan_match(1), "edge", TimeoutKind::Idle, 60, t0());
        let later = t0() + Duration::seconds(30);
        assert!(record.observe(5, later));
        assert_eq!(record.last_used, later);
        assert_eq!(record.last_packet_count, 5);
    }

    // ===== 3. Expiry Condition Tests =====

    #[test]
    fn test_idle_expiry_boundary_is_inclusive() {
        let record = FlowTimeout::new(vlan_match(1), "edge", TimeoutKind::Idle, 60, t0());
        assert!(!record.is_expired(t0() + Duration::seconds(59)));
        assert!(record.is_expired(t0() + Duration::seconds(60)));
    }

    #[test]
    fn test_hard_expiry_ignores_activity() {
        let mut record = FlowTimeout::new(vlan_match(1), "edge", TimeoutKind::Hard, 120, t0());
        // Counter keeps moving; the deadline stands.
        record.observe(10, t0() + Duration::seconds(100));
        assert!(!record.is_expired(t0() + Duration::seconds(119)));
        assert!(record.is_expired(t0() + Duration::seconds(120)));
    }

    #[test]
    fn test_vanished_idle_record_expires_immediately() {
        let mut record = FlowTimeout::new(vlan_match(1), "edge", TimeoutKind::Idle, 600, t0());
        record.mark_vanished();
        assert!(record.is_expired(t0() + Duration::seconds(1)));
    }

    // ===== 4. Snapshot Evaluation Tests =====

    #[test]
    fn test_evaluate_three_cases() {
        let mut records = vec![
            FlowTimeout::new(vlan_match(1), "edge", TimeoutKind::Idle, 60, t0()),
            FlowTimeout::new(vlan_match(2), "edge", TimeoutKind::Idle, 60, t0()),
            FlowTimeout::new(vlan_match(3), "edge", TimeoutKind::Idle, 60, t0()),
        ];
        let snapshot = vec![
            snapshot_entry(vlan_match(1), 0), // unchanged
            snapshot_entry(vlan_match(2), 9), // active
        ];
        let now = t0() + Duration::seconds(30);
        let summary = evaluate_against_snapshot(&mut records, &snapshot, now);
        assert_eq!(
            summary,
            EvaluationSummary {
                refreshed: 1,
                idle: 1,
                vanished: 1,
            }
        );
        assert_eq!(records[0].last_used, t0());
        assert_eq!(records[1].last_used, now);
        assert!(records[2].vanished);
    }

    #[test]
    fn test_evaluate_skips_hard_records() {
        let mut records = vec![FlowTimeout::new(
            vlan_match(1),
            "edge",
            TimeoutKind::Hard,
            60,
            t0(),
        )];
        // Empty snapshot: an idle record would be marked vanished.
        let summary = evaluate_against_snapshot(&mut records, &[], t0() + Duration::seconds(5));
        assert_eq!(summary, EvaluationSummary::default());
        assert!(!records[0].vanished);
    }

    #[test]
    fn test_counter_decrease_still_refreshes() {
        // A reinstall or rollover shows up as a different counter value.
        let mut record = FlowTimeout::new(vlan_match(1), "edge", TimeoutKind::Idle, 60, t0());
        record.observe(50, t0() + Duration::seconds(10));
        let later = t0() + Duration::seconds(20);
        assert!(record.observe(3, later));
        assert_eq!(record.last_used, later);
    }

    // ===== 5. End-to-End Idle Scenario =====

    #[test]
    fn test_idle_rule_lifecycle_at_thirty_second_polls() {
        // Rule installed at t0 with a 60 s idle threshold, polled every 30 s.
        let mut records = vec![FlowTimeout::new(
            vlan_match(7),
            "edge",
            TimeoutKind::Idle,
            60,
            t0(),
        )];
        let snapshot = vec![snapshot_entry(vlan_match(7), 0)];

        let poll1 = t0() + Duration::seconds(30);
        evaluate_against_snapshot(&mut records, &snapshot, poll1);
        assert!(!records[0].is_expired(poll1));

        let poll2 = t0() + Duration::seconds(60);
        evaluate_against_snapshot(&mut records, &snapshot, poll2);
        assert!(records[0].is_expired(poll2));
    }

    #[test]
    fn test_active_rule_survives_at_sixty_seconds() {
        let mut records = vec![FlowTimeout::new(
            vlan_match(7),
            "edge",
            TimeoutKind::Idle,
            60,
            t0(),
        )];
        let poll1 = t0() + Duration::seconds(30);
        evaluate_against_snapshot(&mut records, &[snapshot_entry(vlan_match(7), 0)], poll1);

        let poll2 = t0() + Duration::seconds(60);
        evaluate_against_snapshot(&mut records, &[snapshot_entry(vlan_match(7), 5)], poll2);
        assert!(!records[0].is_expired(poll2));
        assert_eq!(records[0].last_used, poll2);
    }
}
