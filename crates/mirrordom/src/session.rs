//! Tickable sessions: the unit a poll driver runs.
//!
//! A [`BroadcastSession`] pairs a broadcaster with the live document it
//! mirrors; a [`ViewSession`] shares its viewer with the embedding
//! application, which reads the mirrored document and reports frame loads.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use mirrordom_core::Document;
use mirrordom_sync::{
    Broadcaster, MemoryTransport, PollOutcome, Relay, RoundReport, Transport, Viewer,
};

use crate::config::MirrorConfig;
use crate::error::Result;

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was sent or fetched.
    Skipped,
    /// A broadcaster round completed.
    Sent(RoundReport),
    /// A viewer poll completed.
    Received(PollOutcome),
}

/// One end of a mirroring session, driven by timer ticks.
#[async_trait]
pub trait Session: Send {
    /// Run one round-trip. Must not be cancelled once started.
    async fn tick(&mut self) -> Result<TickOutcome>;
}

/// Broadcaster end over a shared live document.
pub struct BroadcastSession<T: Transport> {
    broadcaster: Broadcaster<T>,
    live: Arc<Mutex<Document>>,
}

impl<T: Transport> BroadcastSession<T> {
    pub fn new(broadcaster: Broadcaster<T>, live: Arc<Mutex<Document>>) -> Self {
        Self { broadcaster, live }
    }

    pub fn broadcaster(&self) -> &Broadcaster<T> {
        &self.broadcaster
    }

    pub fn broadcaster_mut(&mut self) -> &mut Broadcaster<T> {
        &mut self.broadcaster
    }

    /// The live document, shared with the application mutating it.
    pub fn live(&self) -> &Arc<Mutex<Document>> {
        &self.live
    }
}

#[async_trait]
impl<T: Transport> Session for BroadcastSession<T> {
    async fn tick(&mut self) -> Result<TickOutcome> {
        // Diff under the lock; the document may change again while sending.
        let request = {
            let doc = self.live.lock().await;
            self.broadcaster.prepare_round(&doc)?
        };
        let Some(request) = request else {
            return Ok(TickOutcome::Skipped);
        };
        let report = self.broadcaster.send_round(request).await?;
        debug!(
            messages = report.messages,
            records = report.records,
            last_change_id = ?report.last_change_id,
            "round complete"
        );
        Ok(TickOutcome::Sent(report))
    }
}

/// Viewer end, shared with the application.
pub struct ViewSession<T: Transport> {
    viewer: Arc<Mutex<Viewer<T>>>,
}

impl<T: Transport> ViewSession<T> {
    pub fn new(viewer: Viewer<T>) -> Self {
        Self {
            viewer: Arc::new(Mutex::new(viewer)),
        }
    }

    /// Handle for reading the mirror and reporting frame loads.
    pub fn viewer(&self) -> &Arc<Mutex<Viewer<T>>> {
        &self.viewer
    }
}

#[async_trait]
impl<T: Transport> Session for ViewSession<T> {
    async fn tick(&mut self) -> Result<TickOutcome> {
        let mut viewer = self.viewer.lock().await;
        match viewer.poll().await? {
            PollOutcome::Skipped => Ok(TickOutcome::Skipped),
            outcome => Ok(TickOutcome::Received(outcome)),
        }
    }
}

/// Both ends of a session wired to one in-process relay.
pub fn in_memory(
    config: MirrorConfig,
    live: Arc<Mutex<Document>>,
) -> (
    BroadcastSession<MemoryTransport>,
    ViewSession<MemoryTransport>,
    Arc<Relay>,
) {
    let relay = Arc::new(Relay::in_memory());
    let broadcaster = Broadcaster::new(MemoryTransport::new(Arc::clone(&relay)), config.broadcaster);
    let viewer = Viewer::new(MemoryTransport::new(Arc::clone(&relay)), config.viewer);
    (
        BroadcastSession::new(broadcaster, live),
        ViewSession::new(viewer),
        relay,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrordom_sync::verify_convergence;

    fn live(markup: &str) -> Arc<Mutex<Document>> {
        Arc::new(Mutex::new(Document::parse(markup).unwrap()))
    }

    #[tokio::test]
    async fn test_tick_pair_converges() {
        let doc = live("<html><head/><body><p>hello</p></body></html>");
        let (mut sender, mut receiver, _relay) = in_memory(MirrorConfig::default(), doc.clone());

        assert!(matches!(sender.tick().await.unwrap(), TickOutcome::Sent(_)));
        assert!(matches!(
            receiver.tick().await.unwrap(),
            TickOutcome::Received(PollOutcome::Applied { .. })
        ));

        let source = doc.lock().await;
        let viewer = receiver.viewer().lock().await;
        assert!(verify_convergence(&source, viewer.document()).is_converged());
    }

    #[tokio::test]
    async fn test_loading_document_skips() {
        let doc = live("<html><head/><body/></html>");
        doc.lock()
            .await
            .set_ready_state(mirrordom_core::ReadyState::Loading);
        let (mut sender, _receiver, relay) = in_memory(MirrorConfig::default(), doc);

        assert_eq!(sender.tick().await.unwrap(), TickOutcome::Skipped);
        assert!(!relay.reset_pending());
    }
}
