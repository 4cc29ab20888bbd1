use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

pub(crate) const TELEMETRY_ENV: &str = "SOCKS5_TUNNEL_TELEMETRY";

static HANDSHAKES_STARTED: AtomicU64 = AtomicU64::new(0);
static HANDSHAKES_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static HANDSHAKES_FAILED: AtomicU64 = AtomicU64::new(0);
static FRAME_BYTES_OUT: AtomicU64 = AtomicU64::new(0);
static REPLY_BYTES_IN: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HandshakeSnapshot {
    pub handshakes_started: u64,
    pub handshakes_succeeded: u64,
    pub handshakes_failed: u64,
    pub frame_out_bytes: u64,
    pub reply_in_bytes: u64,
}

impl HandshakeSnapshot {
    pub fn delta(self, prev: Self) -> Self {
        Self {
            handshakes_started: self
                .handshakes_started
                .saturating_sub(prev.handshakes_started),
            handshakes_succeeded: self
                .handshakes_succeeded
                .saturating_sub(prev.handshakes_succeeded),
            handshakes_failed: self
                .handshakes_failed
                .saturating_sub(prev.handshakes_failed),
            frame_out_bytes: self.frame_out_bytes.saturating_sub(prev.frame_out_bytes),
            reply_in_bytes: self.reply_in_bytes.saturating_sub(prev.reply_in_bytes),
        }
    }

    /// Handshakes that were started and have not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.handshakes_started
            .saturating_sub(self.handshakes_succeeded + self.handshakes_failed)
    }
}

pub(crate) fn enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        let res = std::env::var(TELEMETRY_ENV)
            .ok()
            .map(|value| !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);
        tracing::debug!(enabled = res, "Telemetry status initialized");
        res
    })
}

pub(crate) fn record_handshake_start() {
    if !enabled() {
        return;
    }
    HANDSHAKES_STARTED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_handshake_success() {
    if !enabled() {
        return;
    }
    HANDSHAKES_SUCCEEDED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_handshake_failure() {
    if !enabled() {
        return;
    }
    HANDSHAKES_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_frame_out(bytes: usize) {
    if !enabled() {
        return;
    }
    tracing::trace!(bytes, "record_frame_out");
    FRAME_BYTES_OUT.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub(crate) fn record_reply_in(bytes: usize) {
    if !enabled() {
        return;
    }
    tracing::trace!(bytes, "record_reply_in");
    REPLY_BYTES_IN.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub fn handshake_snapshot() -> HandshakeSnapshot {
    HandshakeSnapshot {
        handshakes_started: HANDSHAKES_STARTED.load(Ordering::Relaxed),
        handshakes_succeeded: HANDSHAKES_SUCCEEDED.load(Ordering::Relaxed),
        handshakes_failed: HANDSHAKES_FAILED.load(Ordering::Relaxed),
        frame_out_bytes: FRAME_BYTES_OUT.load(Ordering::Relaxed),
        reply_in_bytes: REPLY_BYTES_IN.load(Ordering::Relaxed),
    }
}
