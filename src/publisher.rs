//! The publish boundary: serialize a feature vector and hand it to the
//! message bus.
//!
//! Grounded on `examples/original_source/src/kafka_producer.py`'s
//! `KafkaProducerClient` (config defaults, partition-key derivation,
//! delivery bookkeeping). The real client ([`RdKafkaBusClient`], behind the
//! `kafka` feature) wraps `rdkafka`, the real Kafka client crate, rather
//! than hand-rolling the wire protocol.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::error::PublishError;
use crate::feature_vector::FeatureVector;

/// The contract a message-bus client must satisfy to sit behind the
/// publish boundary. Batching, compression, retry and acknowledgment are
/// entirely the client's concern; this boundary guarantees at most one
/// synchronous enqueue attempt per packet.
pub trait BusClient {
    fn send(&mut self, key: &str, payload: &[u8]) -> Result<(), PublishError>;
    /// Poll for delivery callbacks / flush internal queues. A no-op for
    /// clients with nothing to poll.
    fn poll(&mut self) {}
}

/// Producer tuning forwarded verbatim to a real bus client. Defaults match
/// `kafka_producer.py`'s `producer_config`.
#[derive(Debug, Clone)]
pub struct ProducerTuning {
    pub batch_size: u32,
    pub linger_ms: u32,
    pub compression_type: String,
    pub acks: String,
    pub retries: u32,
    pub max_in_flight_requests_per_connection: u32,
    pub buffer_memory: u64,
    pub send_buffer_bytes: u32,
    pub receive_buffer_bytes: u32,
}

impl Default for ProducerTuning {
    fn default() -> Self {
        Self {
            batch_size: 16384,
            linger_ms: 10,
            compression_type: "lz4".to_string(),
            acks: "1".to_string(),
            retries: 3,
            max_in_flight_requests_per_connection: 5,
            buffer_memory: 33_554_432,
            send_buffer_bytes: 131_072,
            receive_buffer_bytes: 65_536,
        }
    }
}

/// Cumulative counters surfaced in the process exit summary, mirroring
/// `kafka_producer.py`'s `get_stats`.
#[derive(Debug, Default)]
pub struct PublisherStats {
    messages_sent: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherStatsSnapshot {
    pub messages_sent: u64,
    pub errors: u64,
}

impl PublisherStats {
    fn snapshot(&self) -> PublisherStatsSnapshot {
        PublisherStatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// The publish boundary: serializes a [`FeatureVector`] to canonical JSON,
/// derives its partition key, and hands it to a [`BusClient`].
pub struct Publisher<C: BusClient> {
    client: C,
    stats: PublisherStats,
}

impl<C: BusClient> Publisher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            stats: PublisherStats::default(),
        }
    }

    /// Serialize and send one feature vector. Failure is logged and the
    /// packet is dropped from the stream — flow state has already been
    /// updated by the time this is called, so there is nothing to roll
    /// back (see the crate's error-handling design notes).
    pub fn emit(&mut self, feature_vector: &FeatureVector) -> bool {
        let key = feature_vector.partition_key();
        let payload = match serde_json::to_vec(feature_vector) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to serialize feature vector");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        match self.client.send(&key, &payload) {
            Ok(()) => {
                let sent = self.stats.messages_sent.fetch_add(1, Ordering::Relaxed) + 1;
                if sent % 1000 == 0 {
                    tracing::info!(sent, "messages delivered");
                }
                self.client.poll();
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to enqueue feature vector");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> PublisherStatsSnapshot {
        self.stats.snapshot()
    }
}

impl BusClient for Box<dyn BusClient> {
    fn send(&mut self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        (**self).send(key, payload)
    }

    fn poll(&mut self) {
        (**self).poll()
    }
}

/// In-memory bus double: every sent payload is captured for inspection.
/// The default client for tests and for running the capture loop without
/// the `kafka` feature.
#[derive(Debug, Default)]
pub struct MockBusClient {
    pub sent: Vec<(String, Vec<u8>)>,
    pub reject_next: bool,
}

impl BusClient for MockBusClient {
    fn send(&mut self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        if self.reject_next {
            self.reject_next = false;
            return Err(PublishError::Rejected("mock rejection".to_string()));
        }
        self.sent.push((key.to_string(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(feature = "kafka")]
pub use kafka_client::RdKafkaBusClient;

#[cfg(feature = "kafka")]
mod kafka_client {
    use super::{BusClient, ProducerTuning, PublishError};
    use rdkafka::ClientConfig;
    use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
    use std::time::Duration;

    /// Real message-bus client, backed by `rdkafka`'s `BaseProducer`.
    /// Grounded on `kafka_producer.py`'s `KafkaProducerClient`.
    pub struct RdKafkaBusClient {
        producer: BaseProducer,
        topic: String,
    }

    impl RdKafkaBusClient {
        pub fn new(
            bootstrap_servers: &str,
            topic: &str,
            client_id: &str,
            tuning: &ProducerTuning,
        ) -> Result<Self, PublishError> {
            let producer = ClientConfig::new()
                .set("bootstrap.servers", bootstrap_servers)
                .set("client.id", client_id)
                .set("batch.size", tuning.batch_size.to_string())
                .set("linger.ms", tuning.linger_ms.to_string())
                .set("compression.type", &tuning.compression_type)
                .set("acks", &tuning.acks)
                .set("retries", tuning.retries.to_string())
                .set(
                    "max.in.flight.requests.per.connection",
                    tuning.max_in_flight_requests_per_connection.to_string(),
                )
                .set("send.buffer.bytes", tuning.send_buffer_bytes.to_string())
                .set(
                    "receive.buffer.bytes",
                    tuning.receive_buffer_bytes.to_string(),
                )
                .create()
                .map_err(|err| PublishError::Rejected(err.to_string()))?;
            Ok(Self {
                producer,
                topic: topic.to_string(),
            })
        }
    }

    impl BusClient for RdKafkaBusClient {
        fn send(&mut self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
            self.producer
                .send(
                    BaseRecord::to(&self.topic)
                        .key(key.as_bytes())
                        .payload(payload),
                )
                .map_err(|(err, _)| PublishError::Rejected(err.to_string()))
        }

        fn poll(&mut self) {
            self.producer.poll(Duration::from_millis(0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_vector::FeatureVector;

    #[test]
    fn successful_emit_increments_messages_sent() {
        let mut publisher = Publisher::new(MockBusClient::default());
        let fv = FeatureVector::unparseable(60, 1.0);
        assert!(publisher.emit(&fv));
        assert_eq!(publisher.stats().messages_sent, 1);
        assert_eq!(publisher.stats().errors, 0);
    }

    #[test]
    fn rejected_send_increments_errors_and_drops_the_record() {
        let mut client = MockBusClient::default();
        client.reject_next = true;
        let mut publisher = Publisher::new(client);
        let fv = FeatureVector::unparseable(60, 1.0);
        assert!(!publisher.emit(&fv));
        assert_eq!(publisher.stats().errors, 1);
        assert_eq!(publisher.stats().messages_sent, 0);
    }

    #[test]
    fn default_producer_tuning_matches_documented_defaults() {
        let tuning = ProducerTuning::default();
        assert_eq!(tuning.batch_size, 16384);
        assert_eq!(tuning.linger_ms, 10);
        assert_eq!(tuning.compression_type, "lz4");
        assert_eq!(tuning.acks, "1");
        assert_eq!(tuning.retries, 3);
    }
}
