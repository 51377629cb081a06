//! Prometheus counters for the dispatch path, exposed at /metrics.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub active_connections: IntGauge,
    pub messages_dispatched: IntCounter,
    pub fanout_pushes: IntCounter,
    pub fanout_drops: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let active_connections =
            IntGauge::new("ws_active_connections", "Live WebSocket connections").unwrap();
        let messages_dispatched = IntCounter::new(
            "chat_messages_dispatched_total",
            "Events accepted by the dispatch engine",
        )
        .unwrap();
        let fanout_pushes = IntCounter::new(
            "chat_fanout_pushes_total",
            "Per-connection push attempts during fan-out",
        )
        .unwrap();
        let fanout_drops = IntCounter::new(
            "chat_fanout_drops_total",
            "Pushes dropped because a connection's send buffer was full",
        )
        .unwrap();
        registry.register(Box::new(active_connections.clone())).unwrap();
        registry.register(Box::new(messages_dispatched.clone())).unwrap();
        registry.register(Box::new(fanout_pushes.clone())).unwrap();
        registry.register(Box::new(fanout_drops.clone())).unwrap();
        Self {
            registry,
            active_connections,
            messages_dispatched,
            fanout_pushes,
            fanout_drops,
        }
    }

    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buf)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
