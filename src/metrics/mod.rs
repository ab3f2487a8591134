//! Prometheus metrics for the relay service.
//!
//! Connection lifecycle, event throughput, fan-out delivery outcomes, and
//! the persistence observability path all report here.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chattu";

lazy_static! {
    /// WebSocket connections opened since start
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// WebSocket connections closed since start
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Currently active WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of active WebSocket connections"
    ).unwrap();

    /// Users currently in the online (in-chat) set
    pub static ref USERS_ONLINE: IntGauge = register_int_gauge!(
        format!("{}_users_online", METRIC_PREFIX),
        "Number of users currently marked online"
    ).unwrap();

    /// Inbound client events by kind
    pub static ref EVENTS_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_received_total", METRIC_PREFIX),
        "Total client events received by kind",
        &["kind"]
    ).unwrap();

    /// Fan-out sends accepted by the transport layer
    pub static ref EVENTS_DELIVERED: IntCounter = register_int_counter!(
        format!("{}_events_delivered_total", METRIC_PREFIX),
        "Total outbound events accepted by connection channels"
    ).unwrap();

    /// Fan-out sends dropped (stale handle between resolve and send)
    pub static ref EVENTS_DROPPED: IntCounter = register_int_counter!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Total outbound events dropped due to stale connections"
    ).unwrap();

    /// Durable writes completed
    pub static ref MESSAGES_PERSISTED: IntCounter = register_int_counter!(
        format!("{}_messages_persisted_total", METRIC_PREFIX),
        "Total messages persisted by the store collaborator"
    ).unwrap();

    /// Durable writes failed (broadcast already delivered)
    pub static ref PERSISTENCE_FAILURES: IntCounter = register_int_counter!(
        format!("{}_persistence_failures_total", METRIC_PREFIX),
        "Total failed durable message writes"
    ).unwrap();

    /// Handshakes refused before registration
    pub static ref AUTH_FAILURES: IntCounter = register_int_counter!(
        format!("{}_auth_failures_total", METRIC_PREFIX),
        "Total rejected connection handshakes"
    ).unwrap();

    /// Malformed payloads rejected without closing the connection
    pub static ref MALFORMED_EVENTS: IntCounter = register_int_counter!(
        format!("{}_malformed_events_total", METRIC_PREFIX),
        "Total malformed client payloads rejected"
    ).unwrap();
}

/// Encode all registered metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
