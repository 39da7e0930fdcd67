//! Per-flow incremental state and the statistics derived from it.

use std::collections::HashMap;

/// Mutable, heap-resident state for one bidirectional flow. Owned
/// exclusively by the [`crate::flow_table::FlowTable`] entry for its key.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub start_time: Option<f64>,
    pub last_time: Option<f64>,
    pub total_packets: u64,

    pub fwd_packets: u64,
    pub fwd_bytes: u64,
    pub fwd_packet_lengths: Vec<f64>,
    pub fwd_inter_arrival_times: Vec<f64>,
    fwd_last_time: Option<f64>,

    pub bwd_packets: u64,
    pub bwd_bytes: u64,
    pub bwd_packet_lengths: Vec<f64>,
    pub bwd_inter_arrival_times: Vec<f64>,
    bwd_last_time: Option<f64>,

    pub all_packet_lengths: Vec<f64>,
    pub all_inter_arrival_times: Vec<f64>,
    last_packet_time: Option<f64>,

    pub tcp_flags_count: HashMap<u8, u64>,
    pub tcp_window_sizes: Vec<f64>,

    /// No producer is defined for this yet (see crate design notes); always
    /// empty, so its derived mean/std are always zero.
    pub active_periods: Vec<f64>,
    pub idle_periods: Vec<f64>,
    last_activity_time: Option<f64>,

    /// Maximum samples retained per growable vector above, FIFO-evicted.
    /// `usize::MAX` (the default) preserves the exact reference semantics.
    max_samples_per_vec: usize,
}

const IDLE_ACTIVITY_GAP_SECS: f64 = 1.0;

impl Default for FlowState {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl FlowState {
    pub fn new(max_samples_per_vec: usize) -> Self {
        Self {
            start_time: None,
            last_time: None,
            total_packets: 0,
            fwd_packets: 0,
            fwd_bytes: 0,
            fwd_packet_lengths: Vec::new(),
            fwd_inter_arrival_times: Vec::new(),
            fwd_last_time: None,
            bwd_packets: 0,
            bwd_bytes: 0,
            bwd_packet_lengths: Vec::new(),
            bwd_inter_arrival_times: Vec::new(),
            bwd_last_time: None,
            all_packet_lengths: Vec::new(),
            all_inter_arrival_times: Vec::new(),
            last_packet_time: None,
            tcp_flags_count: HashMap::new(),
            tcp_window_sizes: Vec::new(),
            active_periods: Vec::new(),
            idle_periods: Vec::new(),
            last_activity_time: None,
            max_samples_per_vec,
        }
    }

    fn push_sample(vec: &mut Vec<f64>, cap: usize, value: f64) {
        if vec.len() >= cap {
            vec.remove(0);
        }
        vec.push(value);
    }

    /// Apply one packet's observation to this flow, in the order required
    /// by the downstream statistics: global counters first, then the
    /// direction-specific counters, then TCP-specific counters, then
    /// activity/idle tracking.
    pub fn update(
        &mut self,
        packet_length: usize,
        timestamp: f64,
        is_forward: bool,
        tcp_flags: u8,
        tcp_window: u16,
    ) {
        if self.start_time.is_none() {
            self.start_time = Some(timestamp);
            self.last_activity_time = Some(timestamp);
        }

        self.total_packets += 1;
        Self::push_sample(
            &mut self.all_packet_lengths,
            self.max_samples_per_vec,
            packet_length as f64,
        );
        self.last_time = Some(timestamp);

        if let Some(last) = self.last_packet_time {
            Self::push_sample(
                &mut self.all_inter_arrival_times,
                self.max_samples_per_vec,
                timestamp - last,
            );
        }
        self.last_packet_time = Some(timestamp);

        if is_forward {
            self.fwd_packets += 1;
            self.fwd_bytes += packet_length as u64;
            Self::push_sample(
                &mut self.fwd_packet_lengths,
                self.max_samples_per_vec,
                packet_length as f64,
            );
            if let Some(last) = self.fwd_last_time {
                Self::push_sample(
                    &mut self.fwd_inter_arrival_times,
                    self.max_samples_per_vec,
                    timestamp - last,
                );
            }
            self.fwd_last_time = Some(timestamp);
        } else {
            self.bwd_packets += 1;
            self.bwd_bytes += packet_length as u64;
            Self::push_sample(
                &mut self.bwd_packet_lengths,
                self.max_samples_per_vec,
                packet_length as f64,
            );
            if let Some(last) = self.bwd_last_time {
                Self::push_sample(
                    &mut self.bwd_inter_arrival_times,
                    self.max_samples_per_vec,
                    timestamp - last,
                );
            }
            self.bwd_last_time = Some(timestamp);
        }

        if tcp_flags > 0 {
            *self.tcp_flags_count.entry(tcp_flags).or_insert(0) += 1;
        }
        if tcp_window > 0 {
            Self::push_sample(
                &mut self.tcp_window_sizes,
                self.max_samples_per_vec,
                tcp_window as f64,
            );
        }

        if let Some(last_activity) = self.last_activity_time {
            let idle = timestamp - last_activity;
            if idle > IDLE_ACTIVITY_GAP_SECS {
                self.idle_periods.push(idle);
            }
        }
        self.last_activity_time = Some(timestamp);
    }

    /// Derive the full statistics set for the current snapshot of this
    /// flow, as of `now` (the current packet's timestamp).
    pub fn stats(&self, now: f64) -> FlowStats {
        let flow_duration = self.start_time.map(|s| now - s).unwrap_or(0.0);

        let (packet_length_mean, packet_length_std, packet_length_min, packet_length_max, packet_length_variance) =
            describe(&self.all_packet_lengths);
        let fwd_packet_length_mean = mean(&self.fwd_packet_lengths);

        let (flow_bytes_per_second, flow_packets_per_second, fwd_packets_per_second, bwd_packets_per_second) =
            if flow_duration > 0.0 {
                (
                    (self.fwd_bytes + self.bwd_bytes) as f64 / flow_duration,
                    self.total_packets as f64 / flow_duration,
                    self.fwd_packets as f64 / flow_duration,
                    self.bwd_packets as f64 / flow_duration,
                )
            } else {
                (0.0, 0.0, 0.0, 0.0)
            };

        let (flow_inter_arrival_time_mean, flow_inter_arrival_time_std) =
            mean_and_sample_std(&self.all_inter_arrival_times);
        let fwd_inter_arrival_time_mean = mean(&self.fwd_inter_arrival_times);
        let bwd_inter_arrival_time_mean = mean(&self.bwd_inter_arrival_times);

        let (active_mean, active_std) = mean_and_sample_std(&self.active_periods);
        let (idle_mean, idle_std) = mean_and_sample_std(&self.idle_periods);

        let tcp_window_size_mean = mean(&self.tcp_window_sizes);
        let tcp_flags_count: u64 = self.tcp_flags_count.values().sum();
        let flow_bytes_total = self.fwd_bytes + self.bwd_bytes;

        FlowStats {
            flow_duration,
            total_fwd_packets: self.fwd_packets,
            total_bwd_packets: self.bwd_packets,
            total_length_fwd_packets: self.fwd_bytes,
            total_length_bwd_packets: self.bwd_bytes,
            packet_length_mean,
            packet_length_std,
            packet_length_min,
            packet_length_max,
            packet_length_variance,
            fwd_packet_length_mean,
            flow_bytes_per_second,
            flow_packets_per_second,
            fwd_packets_per_second,
            bwd_packets_per_second,
            flow_inter_arrival_time_mean,
            flow_inter_arrival_time_std,
            fwd_inter_arrival_time_mean,
            bwd_inter_arrival_time_mean,
            active_mean,
            active_std,
            idle_mean,
            idle_std,
            tcp_window_size_mean,
            tcp_flags_count,
            flow_bytes_total,
        }
    }
}

/// The full derived statistics set for a flow, as of one packet's arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowStats {
    pub flow_duration: f64,
    pub total_fwd_packets: u64,
    pub total_bwd_packets: u64,
    pub total_length_fwd_packets: u64,
    pub total_length_bwd_packets: u64,
    pub packet_length_mean: f64,
    pub packet_length_std: f64,
    pub packet_length_min: f64,
    pub packet_length_max: f64,
    pub packet_length_variance: f64,
    pub fwd_packet_length_mean: f64,
    pub flow_bytes_per_second: f64,
    pub flow_packets_per_second: f64,
    pub fwd_packets_per_second: f64,
    pub bwd_packets_per_second: f64,
    pub flow_inter_arrival_time_mean: f64,
    pub flow_inter_arrival_time_std: f64,
    pub fwd_inter_arrival_time_mean: f64,
    pub bwd_inter_arrival_time_mean: f64,
    pub active_mean: f64,
    pub active_std: f64,
    pub idle_mean: f64,
    pub idle_std: f64,
    pub tcp_window_size_mean: f64,
    pub tcp_flags_count: u64,
    pub flow_bytes_total: u64,
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Sample standard deviation (N-1 divisor). Zero for 0 or 1 samples,
/// matching `statistics.stdev`'s guard in the reference implementation.
fn sample_std(xs: &[f64]) -> f64 {
    sample_variance(xs).sqrt()
}

fn sample_variance(xs: &[f64]) -> f64 {
    if xs.len() <= 1 {
        return 0.0;
    }
    let m = mean(xs);
    let sum_sq = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    sum_sq / (xs.len() - 1) as f64
}

fn mean_and_sample_std(xs: &[f64]) -> (f64, f64) {
    (mean(xs), sample_std(xs))
}

fn describe(xs: &[f64]) -> (f64, f64, f64, f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0, 0.0, 0.0, 0.0);
    }
    let min = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (mean(xs), sample_std(xs), min, max, sample_variance(xs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_packet_flow_has_zero_duration_and_zero_rates() {
        let mut flow = FlowState::default();
        flow.update(100, 10.0, true, 0, 0);
        let stats = flow.stats(10.0);
        assert_eq!(stats.flow_duration, 0.0);
        assert_eq!(stats.flow_bytes_per_second, 0.0);
        assert_eq!(stats.flow_packets_per_second, 0.0);
        assert_eq!(stats.packet_length_std, 0.0);
        assert_eq!(stats.packet_length_mean, 100.0);
    }

    #[test]
    fn inter_arrival_times_track_total_packets_minus_one() {
        let mut flow = FlowState::default();
        flow.update(100, 10.0, true, 0, 0);
        flow.update(100, 10.5, false, 0, 0);
        flow.update(100, 11.2, true, 0, 0);
        assert_eq!(flow.all_inter_arrival_times.len() as u64, flow.total_packets - 1);
        assert_eq!(flow.all_inter_arrival_times, vec![0.5, 0.7]);
    }

    #[test]
    fn idle_period_recorded_only_past_one_second_gap() {
        let mut flow = FlowState::default();
        flow.update(100, 0.0, true, 0, 0);
        flow.update(100, 0.5, true, 0, 0); // under threshold
        flow.update(100, 3.0, true, 0, 0); // 2.5s gap
        assert_eq!(flow.idle_periods, vec![2.5]);
    }

    #[test]
    fn tcp_flags_count_sums_occurrences_not_distinct_flags() {
        let mut flow = FlowState::default();
        flow.update(60, 0.0, true, 0x02, 0); // SYN
        flow.update(60, 0.1, false, 0x12, 0); // SYN+ACK
        flow.update(60, 0.2, true, 0x10, 0); // ACK
        flow.update(60, 0.3, true, 0x10, 0); // ACK again, same flag byte
        let stats = flow.stats(0.3);
        assert_eq!(stats.tcp_flags_count, 4);
    }

    #[test]
    fn sample_stats_use_n_minus_1_divisor() {
        let xs = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let variance = sample_variance(&xs);
        assert!((variance - 4.5714285714).abs() < 1e-6);
    }

    #[test]
    fn zero_window_samples_are_not_recorded() {
        let mut flow = FlowState::default();
        flow.update(60, 0.0, true, 0x02, 0);
        assert!(flow.tcp_window_sizes.is_empty());
        flow.update(60, 0.1, true, 0x02, 4096);
        assert_eq!(flow.tcp_window_sizes, vec![4096.0]);
    }

    #[test]
    fn bounded_vectors_evict_oldest_sample_first() {
        let mut flow = FlowState::new(2);
        flow.update(10, 0.0, true, 0, 0);
        flow.update(20, 1.0, true, 0, 0);
        flow.update(30, 2.0, true, 0, 0);
        assert_eq!(flow.all_packet_lengths, vec![20.0, 30.0]);
    }
}
