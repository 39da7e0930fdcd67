//! The flow table: keyed flow state with opportunistic, idle-time eviction.
//!
//! Grounded on the time-based expiration pattern in this codebase's
//! template cache (`TtlConfig`/`TemplateMetadata::is_expired`) and the
//! atomic-snapshot pattern of its cache metrics, adapted from "evict on
//! access recency" to "evict on idle time" as a flow table requires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::flow_key::FlowKey;
use crate::flow_state::FlowState;

/// How long an idle flow is kept before the sweeper removes it.
pub const IDLE_EXPIRY_SECS: f64 = 300.0;
/// Minimum spacing between opportunistic sweeps.
pub const SWEEP_INTERVAL_SECS: f64 = 60.0;

#[derive(Debug, Clone, Copy)]
pub struct FlowTableConfig {
    pub idle_expiry_secs: f64,
    pub sweep_interval_secs: f64,
    /// Per-flow vector cap; see [`crate::flow_state::FlowState`]. Default
    /// `usize::MAX` keeps the exact reference statistics semantics.
    pub max_samples_per_flow: usize,
}

impl Default for FlowTableConfig {
    fn default() -> Self {
        Self {
            idle_expiry_secs: IDLE_EXPIRY_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            max_samples_per_flow: usize::MAX,
        }
    }
}

/// Read-only, point-in-time view of the table's housekeeping counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTableStats {
    pub flow_count: usize,
    pub sweeps_performed: u64,
    pub flows_evicted: u64,
}

/// Owns every live flow. Not shared across threads; the capture loop is
/// its sole mutator (see the crate's concurrency design notes).
pub struct FlowTable {
    flows: HashMap<FlowKey, FlowState>,
    config: FlowTableConfig,
    last_sweep: Option<f64>,
    sweeps_performed: AtomicU64,
    flows_evicted: AtomicU64,
}

impl FlowTable {
    pub fn new(config: FlowTableConfig) -> Self {
        Self {
            flows: HashMap::new(),
            config,
            last_sweep: None,
            sweeps_performed: AtomicU64::new(0),
            flows_evicted: AtomicU64::new(0),
        }
    }

    /// Return the existing flow for `key`, or insert a fresh zero-valued
    /// one. O(1) expected.
    pub fn touch(&mut self, key: FlowKey) -> &mut FlowState {
        self.flows
            .entry(key)
            .or_insert_with(|| FlowState::new(self.config.max_samples_per_flow))
    }

    /// Remove flows whose `last_time` is older than `now - idle_expiry`,
    /// provided at least `sweep_interval_secs` have elapsed since the last
    /// sweep. A no-op call (too soon) is harmless; it only delays eviction.
    pub fn sweep(&mut self, now: f64) {
        if let Some(last) = self.last_sweep {
            if now - last < self.config.sweep_interval_secs {
                return;
            }
        }
        self.last_sweep = Some(now);
        self.sweeps_performed.fetch_add(1, Ordering::Relaxed);

        let cutoff = now - self.config.idle_expiry_secs;
        let before = self.flows.len();
        self.flows
            .retain(|_, state| state.last_time.is_none_or(|t| t >= cutoff));
        let evicted = (before - self.flows.len()) as u64;
        self.flows_evicted.fetch_add(evicted, Ordering::Relaxed);
    }

    pub fn stats(&self) -> FlowTableStats {
        FlowTableStats {
            flow_count: self.flows.len(),
            sweeps_performed: self.sweeps_performed.load(Ordering::Relaxed),
            flows_evicted: self.flows_evicted.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

impl Default for FlowTable {
    fn default() -> Self {
        Self::new(FlowTableConfig::default())
    }
}
