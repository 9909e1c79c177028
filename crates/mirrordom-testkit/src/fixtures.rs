//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use mirrordom_core::filter::{resolve_element, scope_document, scope_document_mut};
use mirrordom_core::{Document, FramePath, NodeId, Path};
use mirrordom_sync::{
    verify_convergence, Broadcaster, BroadcasterConfig, ConvergenceResult, MemoryTransport,
    PollOutcome, Relay, RoundReport, Viewer, ViewerConfig,
};

/// Parse markup that is known to be well formed.
pub fn parse(markup: &str) -> Document {
    Document::parse(markup).unwrap_or_else(|e| panic!("bad fixture markup {:?}: {}", markup, e))
}

/// An html page with `body` as the content of its body element.
pub fn page(body: &str) -> Document {
    parse(&format!("<html><head/><body>{}</body></html>", body))
}

/// Element at `path` in the main document.
pub fn element_at(doc: &Document, path: &[usize]) -> NodeId {
    resolve_element(doc, &Path::new(path.to_vec()))
        .unwrap_or_else(|e| panic!("no element at {:?}: {}", path, e))
}

/// Load `content` into the frame element at `path` inside the scope `scope`.
pub fn load_frame(doc: &mut Document, scope: &FramePath, path: &[usize], content: Document) {
    let container = scope_document_mut(doc, scope).unwrap_or_else(|e| panic!("no scope {}: {}", scope, e));
    let host = element_at(container, path);
    container
        .frame_mut(host)
        .unwrap_or_else(|| panic!("element at {:?} is not a frame", path))
        .load(content);
}

/// Frame path of the frame element at `path` inside `scope`.
pub fn frame_at(scope: &FramePath, path: &[usize]) -> FramePath {
    scope.child_scope(&Path::new(path.to_vec()))
}

/// Text content of the body of the scope at `frame`.
pub fn body_text(doc: &Document, frame: &FramePath) -> String {
    let scope = scope_document(doc, frame).unwrap_or_else(|e| panic!("no scope {}: {}", frame, e));
    scope.body().map(|b| scope.text_content(b)).unwrap_or_default()
}

/// A broadcaster and a viewer joined by one in-memory relay.
///
/// The viewer side acts as its own frame-load stub: whenever applying
/// stops to wait for a frame, the fixture reports the load straight away.
pub struct MirrorFixture {
    pub relay: Arc<Relay>,
    pub live: Document,
    pub broadcaster: Broadcaster<Arc<MemoryTransport>>,
    pub viewer: Viewer<Arc<MemoryTransport>>,
    pub broadcaster_link: Arc<MemoryTransport>,
    pub viewer_link: Arc<MemoryTransport>,
    /// Frame loads reported by the stub.
    pub loads: Vec<FramePath>,
}

impl MirrorFixture {
    /// Create a fixture mirroring `live` with default configuration.
    pub fn new(live: Document) -> Self {
        Self::with_config(live, BroadcasterConfig::default(), ViewerConfig::default())
    }

    pub fn with_config(live: Document, broadcaster: BroadcasterConfig, viewer: ViewerConfig) -> Self {
        let relay = Arc::new(Relay::in_memory());
        let broadcaster_link = Arc::new(MemoryTransport::new(Arc::clone(&relay)));
        let viewer_link = Arc::new(MemoryTransport::new(Arc::clone(&relay)));
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&broadcaster_link), broadcaster),
            viewer: Viewer::new(Arc::clone(&viewer_link), viewer),
            relay,
            live,
            broadcaster_link,
            viewer_link,
            loads: Vec::new(),
        }
    }

    /// Run one broadcaster round.
    pub async fn broadcast(&mut self) -> mirrordom_sync::Result<Option<RoundReport>> {
        self.broadcaster.poll(&self.live).await
    }

    /// Run one viewer poll, completing frame loads as they are awaited.
    pub async fn receive(&mut self) -> mirrordom_sync::Result<PollOutcome> {
        let mut outcome = self.viewer.poll().await?;
        while let PollOutcome::Suspended { frame } = &outcome {
            let frame = frame.clone();
            self.loads.push(frame.clone());
            outcome = match self.viewer.on_frame_load(&frame) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(outcome)
    }

    /// One broadcaster round followed by one viewer poll.
    pub async fn sync(&mut self) -> mirrordom_sync::Result<PollOutcome> {
        self.broadcast().await?;
        self.receive().await
    }

    /// Compare the viewer's mirror with the live document.
    pub fn convergence(&self) -> ConvergenceResult {
        verify_convergence(&self.live, self.viewer.document())
    }

    /// Panic with the diverging scope unless the mirror matches.
    pub fn assert_converged(&self) {
        if let ConvergenceResult::Diverged { frame, reason } = self.convergence() {
            panic!("scope {} diverged: {}", frame, reason);
        }
    }
}
