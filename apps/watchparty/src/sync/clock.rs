use std::time::{SystemTime, UNIX_EPOCH};

use crate::metrics;

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl LocalClock {
    pub fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

const PRIOR_WEIGHT: f64 = 0.6;
const SAMPLE_WEIGHT: f64 = 0.4;

/// Outcome of feeding one probe reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeSample {
    Accepted { rtt_ms: i64, offset_ms: f64 },
    Rejected { rtt_ms: i64 },
}

/// Estimates `server_now - local_now` from `ping`/`pong` round trips.
///
/// The estimate belongs to the connection, not the room: it survives room
/// changes and reconnects and is only replaced by [`ClockSynchronizer::reset`].
#[derive(Debug, Clone, Default)]
pub struct ClockSynchronizer {
    offset_ms: f64,
    synced: bool,
    samples: u64,
}

impl ClockSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_probe_reply(
        &mut self,
        local_send_ms: u64,
        server_ts: u64,
        local_receive_ms: u64,
    ) -> ProbeSample {
        let rtt_ms = local_receive_ms as i64 - local_send_ms as i64;
        if rtt_ms <= 0 {
            metrics::CLOCK_SAMPLES.with_label_values(&["rejected"]).inc();
            tracing::debug!(target: "watchparty::clock", rtt_ms, "discarding probe with non-positive rtt");
            return ProbeSample::Rejected { rtt_ms };
        }

        let sample = server_ts as f64 + rtt_ms as f64 / 2.0 - local_receive_ms as f64;
        let previous = self.offset_ms;
        self.offset_ms = if self.synced {
            previous * PRIOR_WEIGHT + sample * SAMPLE_WEIGHT
        } else {
            sample
        };
        self.synced = true;
        self.samples += 1;

        metrics::CLOCK_SAMPLES.with_label_values(&["accepted"]).inc();
        metrics::CLOCK_OFFSET_MILLIS.set(self.offset_ms.round() as i64);
        tracing::debug!(
            target: "watchparty::clock",
            rtt_ms,
            offset_ms = self.offset_ms,
            delta_ms = self.offset_ms - previous,
            "clock sample"
        );
        ProbeSample::Accepted {
            rtt_ms,
            offset_ms: self.offset_ms,
        }
    }

    /// Seeds the offset from a bare server stamp while no probe has completed
    /// yet. Later probes refine it through the moving average.
    pub fn seed_from_server_stamp(&mut self, server_ts: u64, local_now_ms: u64) -> bool {
        if self.synced {
            return false;
        }
        self.offset_ms = server_ts as f64 - local_now_ms as f64;
        self.synced = true;
        true
    }

    pub fn server_now(&self, local_now_ms: u64) -> f64 {
        local_now_ms as f64 + self.offset_ms
    }

    /// Converts a server-clock instant into a local-clock deadline.
    pub fn to_local(&self, server_ts: f64) -> f64 {
        server_ts - self.offset_ms
    }

    pub fn offset_ms(&self) -> f64 {
        self.offset_ms
    }

    /// `false` means "no time sync yet": the offset is 0 and still usable.
    pub fn has_sync(&self) -> bool {
        self.synced
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
