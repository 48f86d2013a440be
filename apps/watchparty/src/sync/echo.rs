/// Mute window for player events caused by our own commands.
///
/// Each locally-applied remote command pushes the expiry out to
/// `now + window`; windows are never shortened.
#[derive(Debug, Clone, Default)]
pub struct EchoSuppressor {
    until_ms: u64,
}

impl EchoSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppress(&mut self, now_ms: u64, window_ms: u64) {
        self.until_ms = self.until_ms.max(now_ms.saturating_add(window_ms));
    }

    pub fn is_suppressed(&self, now_ms: u64) -> bool {
        now_ms < self.until_ms
    }

    pub fn expires_at(&self) -> u64 {
        self.until_ms
    }

    pub fn clear(&mut self) {
        self.until_ms = 0;
    }
}
