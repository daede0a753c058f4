//! Flow Statistics Synchronization Daemon
//!
//! Polls every connected OpenFlow switch for flow and port counters on a
//! fixed period, serves the cached results per slice, and retires rules
//! whose idle or hard timeout has elapsed.
//!
//! NIST 800-53 Rev5 [SI-4]: System Monitoring - Periodic flow telemetry collection
//! NIST 800-53 Rev5 [AC-4]: Information Flow Enforcement - Slice-scoped stat visibility

pub mod cache;
pub mod config;
pub mod error;
pub mod persist;
pub mod poller;
pub mod timeout;

pub use cache::{ExpiryCallbacks, FlowStatCache};
pub use config::{FlowstatConfig, PersistenceConfig, PollingConfig, DEFAULT_CONFIG_PATH};
pub use error::*;
pub use persist::{CacheImage, SwitchImage, SCHEMA_VERSION};
pub use poller::{PollOutcome, PollerStats, StatsPoller};
pub use timeout::{evaluate_against_snapshot, EvaluationSummary, FlowTimeout, TimeoutKind};
