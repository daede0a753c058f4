//! Fixed-period poll cycle driver.
//!
//! Each cycle fans switch polls out over a bounded set of tasks, waits for
//! every poll to finish, then persists the cache image. Cycles never
//! overlap; a cycle that runs long simply delays the next tick. One
//! switch's failure clears that switch's telemetry and leaves every other
//! switch untouched.

use crate::cache::FlowStatCache;
use crate::config::FlowstatConfig;
use crate::persist;
use chrono::Utc;
use fsfw_openflow::{
    DatapathId, FlowStatsRequest, PortStatsRequest, StatsQueryError, SwitchStatsClient,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Counters the poller accumulates across cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Completed poll cycles.
    pub cycles: u64,
    /// Individual switch polls that ran to completion, failed or not.
    pub switch_polls: u64,
    /// Switch polls that failed (query error, timeout, or task abort).
    pub poll_failures: u64,
    /// Timeout records removed by the expiry sweep.
    pub flows_expired: u64,
    /// Cache images that could not be written.
    pub persist_failures: u64,
}

/// What polling one switch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Both stat queries answered; telemetry replaced, expiry evaluated.
    Success {
        dpid: DatapathId,
        flows: usize,
        ports: usize,
        expired: usize,
    },
    /// A query failed or timed out; telemetry cleared, tracking kept.
    Failed {
        dpid: DatapathId,
        error: StatsQueryError,
    },
}

fn failed_poll(cache: &FlowStatCache, dpid: DatapathId, error: StatsQueryError) -> PollOutcome {
    cache.clear_flow_cache(dpid);
    PollOutcome::Failed { dpid, error }
}

/// Polls one switch: flow stats, then port stats, then expiry evaluation.
///
/// Every query is bounded by `bound`. A reply that arrives after the bound
/// is dropped along with the query future and never reaches the cache. Any
/// failure clears the switch's telemetry so stale counters cannot be served
/// as current.
async fn poll_switch(
    client: Arc<dyn SwitchStatsClient>,
    cache: Arc<FlowStatCache>,
    dpid: DatapathId,
    bound: Duration,
) -> PollOutcome {
    let flow_query = client.flow_stats(dpid, FlowStatsRequest::all_flows());
    let flow_reply = match timeout(bound, flow_query).await {
        Ok(Ok(stats)) => stats,
        Ok(Err(error)) => return failed_poll(&cache, dpid, error),
        Err(_) => return failed_poll(&cache, dpid, StatsQueryError::Timeout(dpid)),
    };

    let port_query = client.port_stats(dpid, PortStatsRequest::all_ports());
    let port_reply = match timeout(bound, port_query).await {
        Ok(Ok(stats)) => stats,
        Ok(Err(error)) => return failed_poll(&cache, dpid, error),
        Err(_) => return failed_poll(&cache, dpid, StatsQueryError::Timeout(dpid)),
    };

    let flows = flow_reply.len();
    let ports = port_reply.len();
    cache.set_flow_cache(dpid, flow_reply);
    cache.set_port_cache(dpid, port_reply);

    let now = Utc::now();
    let mut expired = 0;
    if !cache.get_possible_expired_flows(dpid).is_empty() {
        cache.update_flow_timeouts(dpid, now);
        expired = cache.check_expire_flows(dpid, now).len();
    }

    PollOutcome::Success {
        dpid,
        flows,
        ports,
        expired,
    }
}

/// The poll cycle driver.
pub struct StatsPoller {
    config: FlowstatConfig,
    client: Arc<dyn SwitchStatsClient>,
    cache: Arc<FlowStatCache>,
    stats: PollerStats,
}

impl StatsPoller {
    /// Creates a poller over the given client and cache.
    pub fn new(
        config: FlowstatConfig,
        client: Arc<dyn SwitchStatsClient>,
        cache: Arc<FlowStatCache>,
    ) -> Self {
        StatsPoller {
            config,
            client,
            cache,
            stats: PollerStats::default(),
        }
    }

    /// Current counter values.
    pub fn stats(&self) -> PollerStats {
        self.stats
    }

    /// Runs one complete poll cycle: every connected switch is polled (at
    /// most `max_concurrent_polls` in flight), then the cache image is
    /// persisted.
    pub async fn run_cycle(&mut self) {
        let dpids = self.client.switches();
        debug!(switches = dpids.len(), "starting poll cycle");

        let limit = Arc::new(Semaphore::new(self.config.polling.max_concurrent_polls));
        let bound = self.config.stats_timeout();
        let mut tasks: JoinSet<PollOutcome> = JoinSet::new();
        let mut task_dpids: HashMap<tokio::task::Id, DatapathId> = HashMap::new();

        for dpid in dpids {
            let permits = Arc::clone(&limit);
            let client = Arc::clone(&self.client);
            let cache = Arc::clone(&self.cache);
            let handle = tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return PollOutcome::Failed {
                            dpid,
                            error: StatsQueryError::Protocol {
                                dpid,
                                reason: "poll scheduler shut down".to_string(),
                            },
                        }
                    }
                };
                poll_switch(client, cache, dpid, bound).await
            });
            task_dpids.insert(handle.id(), dpid);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_id, outcome)) => self.apply_outcome(outcome),
                Err(join_err) => {
                    // A panicked poll task must not take the cycle down;
                    // treat it like any other failed poll.
                    self.stats.switch_polls += 1;
                    self.stats.poll_failures += 1;
                    match task_dpids.get(&join_err.id()) {
                        Some(&dpid) => {
                            self.cache.clear_flow_cache(dpid);
                            warn!(dpid = %dpid, error = %join_err, "switch poll task aborted");
                        }
                        None => warn!(error = %join_err, "switch poll task aborted"),
                    }
                }
            }
        }

        self.persist_cache();
        self.stats.cycles += 1;
    }

    fn apply_outcome(&mut self, outcome: PollOutcome) {
        self.stats.switch_polls += 1;
        match outcome {
            PollOutcome::Success {
                dpid,
                flows,
                ports,
                expired,
            } => {
                self.stats.flows_expired += expired as u64;
                debug!(dpid = %dpid, flows, ports, expired, "polled switch");
            }
            PollOutcome::Failed { dpid, error } => {
                self.stats.poll_failures += 1;
                warn!(dpid = %dpid, error = %error, "switch poll failed, telemetry cleared");
            }
        }
    }

    /// Writes the cache image. Persistence failures are logged and counted
    /// but never stop the poller.
    fn persist_cache(&mut self) {
        let image = self.cache.snapshot(Utc::now());
        if let Err(error) = persist::save_atomic(&image, &self.config.persistence.cache_file) {
            self.stats.persist_failures += 1;
            warn!(error = %error, "failed to persist cache image");
        }
    }

    /// Runs poll cycles at the configured period until `shutdown` is set,
    /// then persists one final image.
    ///
    /// The first cycle starts immediately. The shutdown flag is rechecked
    /// between ticks so a stop request does not wait out a full period.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.polling.poll_interval_secs,
            "stat poller running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    self.run_cycle().await;
                }
                _ = tokio::time::sleep(Duration::from_millis(200)) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }

        self.persist_cache();
        info!(cycles = self.stats.cycles, "stat poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fsfw_openflow::{FlowMatch, FlowStatsEntry, PortStatsEntry};
    use parking_lot::Mutex;

    /// Client whose replies are fixed per switch at construction.
    struct StaticClient {
        flow_replies: Mutex<HashMap<DatapathId, Result<Vec<FlowStatsEntry>, StatsQueryError>>>,
        port_replies: Mutex<HashMap<DatapathId, Result<Vec<PortStatsEntry>, StatsQueryError>>>,
        dpids: Vec<DatapathId>,
        hang: bool,
    }

    impl StaticClient {
        fn new(dpids: Vec<DatapathId>) -> Self {
            StaticClient {
                flow_replies: Mutex::new(HashMap::new()),
                port_replies: Mutex::new(HashMap::new()),
                dpids,
                hang: false,
            }
        }

        fn with_flows(self, dpid: DatapathId, reply: Vec<FlowStatsEntry>) -> Self {
            self.flow_replies.lock().insert(dpid, Ok(reply));
            self
        }

        fn with_flow_error(self, dpid: DatapathId, error: StatsQueryError) -> Self {
            self.flow_replies.lock().insert(dpid, Err(error));
            self
        }

        fn with_ports(self, dpid: DatapathId, reply: Vec<PortStatsEntry>) -> Self {
            self.port_replies.lock().insert(dpid, Ok(reply));
            self
        }

        fn hanging(mut self) -> Self {
            self.hang = true;
            self
        }
    }

    #[async_trait]
    impl SwitchStatsClient for StaticClient {
        fn switches(&self) -> Vec<DatapathId> {
            self.dpids.clone()
        }

        async fn flow_stats(
            &self,
            dpid: DatapathId,
            _request: FlowStatsRequest,
        ) -> Result<Vec<FlowStatsEntry>, StatsQueryError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.flow_replies
                .lock()
                .get(&dpid)
                .cloned()
                .unwrap_or(Err(StatsQueryError::NotConnected(dpid)))
        }

        async fn port_stats(
            &self,
            dpid: DatapathId,
            _request: PortStatsRequest,
        ) -> Result<Vec<PortStatsEntry>, StatsQueryError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.port_replies
                .lock()
                .get(&dpid)
                .cloned()
                .unwrap_or(Err(StatsQueryError::NotConnected(dpid)))
        }
    }

    fn dpid(raw: u64) -> DatapathId {
        DatapathId::new(raw)
    }

    #[tokio::test]
    async fn test_poll_switch_caches_both_replies() {
        let client = Arc::new(
            StaticClient::new(vec![dpid(1)])
                .with_flows(dpid(1), vec![FlowStatsEntry::new(FlowMatch::any())])
                .with_ports(dpid(1), vec![PortStatsEntry::new(1), PortStatsEntry::new(2)]),
        );
        let cache = Arc::new(FlowStatCache::new());

        let outcome = poll_switch(
            client,
            Arc::clone(&cache),
            dpid(1),
            Duration::from_secs(10),
        )
        .await;

        assert_eq!(
            outcome,
            PollOutcome::Success {
                dpid: dpid(1),
                flows: 1,
                ports: 2,
                expired: 0,
            }
        );
        assert_eq!(cache.get_switch_flow_stats(dpid(1)).len(), 1);
        assert_eq!(cache.get_port_stats(dpid(1)).len(), 2);
    }

    #[tokio::test]
    async fn test_poll_switch_failure_clears_telemetry() {
        let client = Arc::new(
            StaticClient::new(vec![dpid(1)])
                .with_flow_error(dpid(1), StatsQueryError::NotConnected(dpid(1))),
        );
        let cache = Arc::new(FlowStatCache::new());
        cache.set_flow_cache(dpid(1), vec![FlowStatsEntry::new(FlowMatch::any())]);

        let outcome = poll_switch(
            client,
            Arc::clone(&cache),
            dpid(1),
            Duration::from_secs(10),
        )
        .await;

        assert!(matches!(outcome, PollOutcome::Failed { .. }));
        assert!(cache.get_switch_flow_stats(dpid(1)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_switch_times_out() {
        let client = Arc::new(StaticClient::new(vec![dpid(1)]).hanging());
        let cache = Arc::new(FlowStatCache::new());

        let outcome = poll_switch(
            client,
            Arc::clone(&cache),
            dpid(1),
            Duration::from_secs(10),
        )
        .await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                dpid: dpid(1),
                error: StatsQueryError::Timeout(dpid(1)),
            }
        );
    }

    #[tokio::test]
    async fn test_cycle_counts_mixed_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FlowstatConfig::default();
        config.persistence.cache_file = dir.path().join("flow-cache.json");

        let client = Arc::new(
            StaticClient::new(vec![dpid(1), dpid(2)])
                .with_flows(dpid(1), vec![])
                .with_ports(dpid(1), vec![])
                .with_flow_error(dpid(2), StatsQueryError::NotConnected(dpid(2))),
        );
        let cache = Arc::new(FlowStatCache::new());
        let mut poller = StatsPoller::new(config, client, cache);

        poller.run_cycle().await;

        let stats = poller.stats();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.switch_polls, 2);
        assert_eq!(stats.poll_failures, 1);
        assert_eq!(stats.persist_failures, 0);
        assert!(dir.path().join("flow-cache.json").exists());
    }
}
