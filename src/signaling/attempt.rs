use peercall_core::SessionKey;

/// Tracks outgoing call attempts so that a relay error is reported once per
/// attempt, however many frames the relay sends for it.
#[derive(Debug, Default)]
pub(crate) struct AttemptTracker {
    current: u64,
    reported: Option<u64>,
    session: Option<SessionKey>,
}

impl AttemptTracker {
    /// Start a new attempt for `key` and return its id.
    pub fn begin(&mut self, key: SessionKey) -> u64 {
        self.current += 1;
        self.session = Some(key);
        self.current
    }

    /// Whether this is the first error reported for the current attempt.
    pub fn report_not_found(&mut self) -> bool {
        if self.reported == Some(self.current) {
            return false;
        }
        self.reported = Some(self.current);
        true
    }

    pub fn session(&self) -> Option<&SessionKey> {
        self.session.as_ref()
    }
}
