//! The emitted record: a fixed set of per-packet + per-flow statistics,
//! serialized to the exact JSON schema the downstream bus consumers expect.
//!
//! Field set and `protocol_name` mapping are grounded on
//! `examples/original_source/src/json_converter.py`'s `features_to_dict`.

use serde::Serialize;

use crate::flow_state::FlowStats;
use crate::header::TransportPacket;
use crate::protocol;
use crate::time;

pub const LABEL_BENIGN: &str = "BENIGN";
pub const LABEL_PARSING_ERROR: &str = "PARSING_ERROR";

/// One flow-annotated observation of a single packet. Constructed fresh
/// per packet; never stored.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureVector {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,

    pub packet_length: usize,
    pub header_length: usize,
    pub ttl: u8,
    pub tos: u8,

    pub timestamp: u64,
    pub flow_duration: f64,

    pub tcp_flags: u8,
    pub tcp_window: u16,
    pub tcp_seq: u32,
    pub tcp_ack: u32,
    pub tcp_flag_fin: u8,
    pub tcp_flag_syn: u8,
    pub tcp_flag_rst: u8,
    pub tcp_flag_psh: u8,
    pub tcp_flag_ack: u8,
    pub tcp_flag_urg: u8,

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

    pub label: String,
    pub capture_timestamp: String,
    pub protocol_name: String,
}

impl FeatureVector {
    /// Build a feature vector from a parsed packet and the flow statistics
    /// snapshot computed for it.
    pub fn from_parsed(packet: &TransportPacket, stats: FlowStats) -> Self {
        Self {
            src_ip: packet.src_ip.to_string(),
            dst_ip: packet.dst_ip.to_string(),
            src_port: packet.src_port,
            dst_port: packet.dst_port,
            protocol: packet.protocol,
            packet_length: packet.packet_length,
            header_length: packet.header_length,
            ttl: packet.ttl,
            tos: packet.tos,
            timestamp: time::micros(packet.timestamp),
            flow_duration: stats.flow_duration,
            tcp_flags: packet.tcp_flags,
            tcp_window: packet.tcp_window,
            tcp_seq: packet.tcp_seq,
            tcp_ack: packet.tcp_ack,
            tcp_flag_fin: packet.tcp_flag_fin() as u8,
            tcp_flag_syn: packet.tcp_flag_syn() as u8,
            tcp_flag_rst: packet.tcp_flag_rst() as u8,
            tcp_flag_psh: packet.tcp_flag_psh() as u8,
            tcp_flag_ack: packet.tcp_flag_ack() as u8,
            tcp_flag_urg: packet.tcp_flag_urg() as u8,
            total_fwd_packets: stats.total_fwd_packets,
            total_bwd_packets: stats.total_bwd_packets,
            total_length_fwd_packets: stats.total_length_fwd_packets,
            total_length_bwd_packets: stats.total_length_bwd_packets,
            packet_length_mean: stats.packet_length_mean,
            packet_length_std: stats.packet_length_std,
            packet_length_min: stats.packet_length_min,
            packet_length_max: stats.packet_length_max,
            packet_length_variance: stats.packet_length_variance,
            fwd_packet_length_mean: stats.fwd_packet_length_mean,
            flow_bytes_per_second: stats.flow_bytes_per_second,
            flow_packets_per_second: stats.flow_packets_per_second,
            fwd_packets_per_second: stats.fwd_packets_per_second,
            bwd_packets_per_second: stats.bwd_packets_per_second,
            flow_inter_arrival_time_mean: stats.flow_inter_arrival_time_mean,
            flow_inter_arrival_time_std: stats.flow_inter_arrival_time_std,
            fwd_inter_arrival_time_mean: stats.fwd_inter_arrival_time_mean,
            bwd_inter_arrival_time_mean: stats.bwd_inter_arrival_time_mean,
            active_mean: stats.active_mean,
            active_std: stats.active_std,
            idle_mean: stats.idle_mean,
            idle_std: stats.idle_std,
            tcp_window_size_mean: stats.tcp_window_size_mean,
            tcp_flags_count: stats.tcp_flags_count,
            flow_bytes_total: stats.flow_bytes_total,
            label: LABEL_BENIGN.to_string(),
            capture_timestamp: chrono::Utc::now().to_rfc3339(),
            protocol_name: protocol::feature_name(packet.protocol),
        }
    }

    /// Build the sentinel record for a frame that couldn't be decoded.
    /// Carries only its length and capture timestamp; every flow-derived
    /// field is zeroed and `label` is `PARSING_ERROR`.
    pub fn unparseable(packet_length: usize, timestamp: f64) -> Self {
        Self {
            src_ip: String::new(),
            dst_ip: String::new(),
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            packet_length,
            header_length: 0,
            ttl: 0,
            tos: 0,
            timestamp: time::micros(timestamp),
            flow_duration: 0.0,
            tcp_flags: 0,
            tcp_window: 0,
            tcp_seq: 0,
            tcp_ack: 0,
            tcp_flag_fin: 0,
            tcp_flag_syn: 0,
            tcp_flag_rst: 0,
            tcp_flag_psh: 0,
            tcp_flag_ack: 0,
            tcp_flag_urg: 0,
            total_fwd_packets: 0,
            total_bwd_packets: 0,
            total_length_fwd_packets: 0,
            total_length_bwd_packets: 0,
            packet_length_mean: 0.0,
            packet_length_std: 0.0,
            packet_length_min: 0.0,
            packet_length_max: 0.0,
            packet_length_variance: 0.0,
            fwd_packet_length_mean: 0.0,
            flow_bytes_per_second: 0.0,
            flow_packets_per_second: 0.0,
            fwd_packets_per_second: 0.0,
            bwd_packets_per_second: 0.0,
            flow_inter_arrival_time_mean: 0.0,
            flow_inter_arrival_time_std: 0.0,
            fwd_inter_arrival_time_mean: 0.0,
            bwd_inter_arrival_time_mean: 0.0,
            active_mean: 0.0,
            active_std: 0.0,
            idle_mean: 0.0,
            idle_std: 0.0,
            tcp_window_size_mean: 0.0,
            tcp_flags_count: 0,
            flow_bytes_total: 0,
            label: LABEL_PARSING_ERROR.to_string(),
            capture_timestamp: chrono::Utc::now().to_rfc3339(),
            protocol_name: protocol::feature_name(0),
        }
    }

    /// The partition key the publisher derives for this vector:
    /// `"{src_ip}:{src_port}"`, or `"unknown:0"` when unavailable.
    pub fn partition_key(&self) -> String {
        if self.label == LABEL_PARSING_ERROR {
            "unknown:0".to_string()
        } else {
            format!("{}:{}", self.src_ip, self.src_port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_state::FlowState;

    #[test]
    fn parsing_error_sentinel_has_zeroed_flow_fields() {
        let fv = FeatureVector::unparseable(64, 12.5);
        assert_eq!(fv.label, LABEL_PARSING_ERROR);
        assert_eq!(fv.packet_length, 64);
        assert_eq!(fv.timestamp, 12_500_000);
        assert_eq!(fv.total_fwd_packets, 0);
        assert_eq!(fv.partition_key(), "unknown:0");
    }

    #[test]
    fn successful_parse_uses_src_ip_port_as_partition_key() {
        let packet = TransportPacket {
            src_ip: "10.0.0.1".parse().unwrap(),
            dst_ip: "10.0.0.2".parse().unwrap(),
            src_port: 4444,
            dst_port: 80,
            protocol: 6,
            packet_length: 60,
            header_length: 20,
            ttl: 64,
            tos: 0,
            timestamp: 1.0,
            tcp_seq: 0,
            tcp_ack: 0,
            tcp_flags: 0x02,
            tcp_window: 65535,
        };
        let flow = FlowState::default();
        let fv = FeatureVector::from_parsed(&packet, flow.stats(1.0));
        assert_eq!(fv.label, LABEL_BENIGN);
        assert_eq!(fv.partition_key(), "10.0.0.1:4444");
        assert_eq!(fv.protocol_name, "TCP");
        assert_eq!(fv.tcp_flag_syn, 1);
        assert_eq!(fv.tcp_flag_ack, 0);
    }
}
