use chrono::{DateTime, Duration, Utc};

/// Start and end stamps of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallTiming {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallTiming {
    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.started_at = Some(at);
        self.ended_at = None;
    }

    /// Stamp the end unless already stamped.
    pub fn mark_ended(&mut self, at: DateTime<Utc>) {
        if self.ended_at.is_none() {
            self.ended_at = Some(at);
        }
    }

    /// Elapsed time up to the end stamp, or up to `now` while the call is
    /// live. `None` if the call never connected.
    pub fn duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.ended_at.unwrap_or(now);
        Some((end - started).max(Duration::zero()))
    }

    pub fn formatted(&self, now: DateTime<Utc>) -> Option<String> {
        self.duration(now).map(format_duration)
    }
}

/// `m:ss`, minutes unbounded.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}
