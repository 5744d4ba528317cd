//! Outbound candidate pacing.
//!
//! Each local candidate is held for the configured delay after discovery and
//! then sent. Candidates leave in discovery order because they share one
//! queue and one deadline offset.

use super::channel::SignalChannel;
use log::debug;
use peercall_core::proto::{CandidatePayload, IceCandidate};
use peercall_core::{Envelope, PeerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// Addressing shared by every candidate of one session.
#[derive(Debug, Clone)]
pub(crate) struct CandidateRoute {
    pub to: PeerId,
    pub from: PeerId,
    pub session_id: String,
}

/// Producer side of a session's pacer.
#[derive(Clone)]
pub(crate) struct CandidatePacer {
    queue: mpsc::UnboundedSender<(Instant, IceCandidate)>,
    pacing: Duration,
}

impl CandidatePacer {
    pub fn spawn(
        channel: Arc<SignalChannel>,
        pacing: Duration,
        route: CandidateRoute,
    ) -> (Self, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::unbounded_channel::<(Instant, IceCandidate)>();
        let task = tokio::spawn(async move {
            while let Some((due, candidate)) = rx.recv().await {
                if due > Instant::now() {
                    sleep_until(due).await;
                }
                debug!("Sending paced candidate for {}", route.session_id);
                channel
                    .send(&Envelope::Candidate(CandidatePayload {
                        to: route.to.clone(),
                        from: route.from.clone(),
                        candidate,
                        session_id: route.session_id.clone(),
                    }))
                    .await;
            }
        });
        (Self { queue, pacing }, task)
    }

    /// Queue a candidate discovered just now.
    pub fn submit(&self, candidate: IceCandidate) {
        let due = Instant::now() + self.pacing;
        if self.queue.send((due, candidate)).is_err() {
            debug!("Candidate pacer stopped, dropping candidate");
        }
    }
}
