use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static HARD_SEEKS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "watchparty_hard_seeks_total",
            "Hard seeks issued by the follower drift controller",
        ),
        &["reason"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static RATE_ADJUSTMENTS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "watchparty_rate_adjustments_total",
        "Playback rate changes applied by the drift controller",
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static DRIFT_MILLIS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new(
        "watchparty_drift_millis",
        "Last signed drift between expected and local position",
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static CLOCK_OFFSET_MILLIS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new(
        "watchparty_clock_offset_millis",
        "Smoothed server minus local clock offset",
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static CLOCK_SAMPLES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "watchparty_clock_samples_total",
            "Clock probe replies, accepted or rejected",
        ),
        &["outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static HOST_REPORTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "watchparty_host_reports_total",
            "Authoritative reports sent by the host",
        ),
        &["kind"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static RELAY_RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "watchparty_relay_reconnects_total",
        "Reconnect attempts against the relay",
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static INBOUND_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "watchparty_inbound_dropped_total",
            "Inbound relay messages dropped before dispatch",
        ),
        &["reason"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

/// Prometheus text exposition of everything registered so far.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_touched_metrics() {
        HARD_SEEKS.with_label_values(&["soft_ceiling"]).inc();
        RATE_ADJUSTMENTS.inc();
        let text = render();
        assert!(text.contains("watchparty_hard_seeks_total{reason=\"soft_ceiling\"}"));
        assert!(text.contains("watchparty_rate_adjustments_total"));
    }
}
