/// A single pending action due at a local-clock deadline.
///
/// Scheduling replaces whatever was pending; actions never stack.
#[derive(Debug, Clone)]
pub struct Scheduled<A> {
    slot: Option<(u64, A)>,
}

impl<A> Default for Scheduled<A> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<A> Scheduled<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the action that was superseded, if any.
    pub fn schedule(&mut self, due_ms: u64, action: A) -> Option<A> {
        self.slot.replace((due_ms, action)).map(|(_, old)| old)
    }

    pub fn cancel(&mut self) -> Option<A> {
        self.slot.take().map(|(_, action)| action)
    }

    pub fn deadline(&self) -> Option<u64> {
        self.slot.as_ref().map(|(due, _)| *due)
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn take_due(&mut self, now_ms: u64) -> Option<A> {
        match self.slot {
            Some((due, _)) if due <= now_ms => self.cancel(),
            _ => None,
        }
    }
}
