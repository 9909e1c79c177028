//! Broadcaster session: diff every scope of the live document and push
//! the results to the relay.

use std::time::Duration;

use tracing::{debug, info, warn};

use mirrordom_core::filter::{elements_with_paths, scope_document};
use mirrordom_core::{
    diff, property_records, serialize_document, DiffOutcome, Document, FramePath, PropertyTable,
    Snapshot,
};

use crate::error::{Result, SyncError};
use crate::messages::{limits, FrameMessage, InitData, SendUpdateRequest, SendUpdateResponse};
use crate::registry::{ScopeRegistry, ScopeState};
use crate::transport::{Transport, TransportExt};

/// Configuration for the broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Time between rounds.
    pub poll_interval: Duration,
    /// Announce the main scope as `new_instance` on the first round. When
    /// off, it goes out as `new_page`, for joining an existing session.
    pub send_new_instance_on_start: bool,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            send_new_instance_on_start: true,
        }
    }
}

/// Summary of one completed round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Per-scope messages sent.
    pub messages: usize,
    /// Diff records sent, init props included.
    pub records: usize,
    /// Active frame scopes reported.
    pub frames: usize,
    pub last_change_id: Option<u64>,
    /// The relay asked for every scope to be resent.
    pub reset_requested: bool,
}

/// Broadcaster session state.
pub struct Broadcaster<T: Transport> {
    transport: T,
    config: BroadcasterConfig,
    registry: ScopeRegistry,
    table: PropertyTable,
    /// A round is between prepare and finish.
    sending: bool,
    last_change_id: Option<u64>,
}

impl<T: Transport> Broadcaster<T> {
    /// Create a new broadcaster session.
    pub fn new(transport: T, config: BroadcasterConfig) -> Self {
        Self {
            transport,
            config,
            registry: ScopeRegistry::new(),
            table: PropertyTable::new(),
            sending: false,
            last_change_id: None,
        }
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Last change id the relay reported.
    pub fn last_change_id(&self) -> Option<u64> {
        self.last_change_id
    }

    /// Resend every scope whole on the next round.
    pub fn request_full_resend(&mut self) {
        self.registry.mark_all_for_reset();
    }

    /// Run one round: diff, push, record the outcome.
    ///
    /// Returns `None` when the tick was skipped.
    pub async fn poll(&mut self, doc: &Document) -> Result<Option<RoundReport>> {
        let Some(request) = self.prepare_round(doc)? else {
            return Ok(None);
        };
        self.send_round(request).await.map(Some)
    }

    /// Push a prepared request and record the relay's answer.
    pub async fn send_round(&mut self, request: SendUpdateRequest) -> Result<RoundReport> {
        let messages = request.messages.len();
        let records = request.messages.iter().map(FrameMessage::record_count).sum();
        let frames = request.iframes.len();

        match self.transport.send_update(&request).await {
            Ok(response) => {
                let reset_requested = response.reset_requested;
                self.finish_round(response);
                Ok(RoundReport {
                    messages,
                    records,
                    frames,
                    last_change_id: self.last_change_id,
                    reset_requested,
                })
            }
            Err(err) => {
                self.abort_round();
                Err(err)
            }
        }
    }

    /// Compute this round's request and mark the round in flight.
    ///
    /// Returns `None` when a round is already in flight or the live
    /// document is loading.
    pub fn prepare_round(&mut self, doc: &Document) -> Result<Option<SendUpdateRequest>> {
        if self.sending {
            debug!("previous round still in flight, skipping tick");
            return Ok(None);
        }
        if doc.is_loading() {
            debug!("document loading, skipping tick");
            return Ok(None);
        }

        let mut messages = Vec::new();
        let mut iframes = Vec::new();
        let mut pending = vec![FramePath::main()];
        while let Some(frame) = pending.pop() {
            let scope = scope_document(doc, &frame)
                .map_err(|e| SyncError::Invariant(format!("scope {} vanished: {}", frame, e)))?;
            if let Some(message) = self.sync_scope(&frame, scope) {
                messages.push(message);
            }

            let mut children = Vec::new();
            for (path, id) in elements_with_paths(scope, scope.root()) {
                let Some(hosted) = scope.frame(id) else {
                    continue;
                };
                let Some(child_doc) = hosted.document() else {
                    continue;
                };
                let child = frame.child_scope(&path);
                iframes.push(child.clone());
                if hosted.is_ready() && !child_doc.is_loading() {
                    children.push(child);
                } else {
                    debug!(frame = %child, "frame loading, not diffed");
                }
            }
            pending.extend(children.into_iter().rev());
        }

        for frame in self.registry.retain_active(&iframes) {
            debug!(frame = %frame, "frame gone");
        }

        self.sending = true;
        Ok(Some(SendUpdateRequest { messages, iframes }))
    }

    /// Record the relay's answer to the in-flight round.
    pub fn finish_round(&mut self, response: SendUpdateResponse) {
        self.sending = false;
        self.last_change_id = response.last_change_id;
        if response.reset_requested {
            info!("relay requested a reset, resending every scope");
            self.registry.mark_all_for_reset();
        }
    }

    /// Give up on the in-flight round. Its diffs are lost, so every scope
    /// goes out whole next time.
    pub fn abort_round(&mut self) {
        if self.sending {
            warn!("round failed, scheduling full resend");
        }
        self.sending = false;
        self.registry.mark_all_for_reset();
    }

    /// Bring one scope up to date, returning the message to send, if any.
    fn sync_scope(&mut self, frame: &FramePath, doc: &Document) -> Option<FrameMessage> {
        let generation = doc.generation();
        let state = match self.registry.get(frame) {
            None => {
                let new_instance = !frame.is_main() || self.config.send_new_instance_on_start;
                return Some(self.send_whole(frame, doc, new_instance));
            }
            Some(state) if state.needs_reset || state.generation != generation => {
                return Some(self.send_whole(frame, doc, false));
            }
            Some(state) => state,
        };

        match diff(doc, &state.snapshot, &mut self.table) {
            DiffOutcome::Unchanged => None,
            DiffOutcome::NeedsReset => {
                info!(frame = %frame, "root changed, resending scope");
                Some(self.send_whole(frame, doc, false))
            }
            DiffOutcome::Changed(records) if records.len() > limits::MAX_RECORDS_PER_DIFFS => {
                info!(frame = %frame, count = records.len(), "diff too large, resending scope");
                Some(self.send_whole(frame, doc, false))
            }
            DiffOutcome::Changed(records) => {
                debug!(frame = %frame, count = records.len(), "scope changed");
                let snapshot = Snapshot::capture(doc, &mut self.table);
                if let Some(state) = self.registry.get_mut(frame) {
                    state.snapshot = snapshot;
                }
                self.registry.remove_truncated(frame, &records);
                Some(FrameMessage::Diffs {
                    frame: frame.clone(),
                    diffs: records,
                })
            }
        }
    }

    fn send_whole(&mut self, frame: &FramePath, doc: &Document, new_instance: bool) -> FrameMessage {
        let data = InitData {
            html: serialize_document(doc),
            props: property_records(doc, &mut self.table),
            url: doc.url().map(str::to_string),
        };
        let snapshot = Snapshot::capture(doc, &mut self.table);
        let dropped = self.registry.remove_descendants(frame);
        if !dropped.is_empty() {
            debug!(frame = %frame, count = dropped.len(), "nested scopes reset");
        }
        self.registry
            .insert(frame.clone(), ScopeState::new(snapshot, doc.generation()));

        let frame = frame.clone();
        if new_instance {
            info!(frame = %frame, "sending new scope");
            FrameMessage::NewInstance { frame, data }
        } else {
            info!(frame = %frame, "sending scope reset");
            FrameMessage::NewPage { frame, data }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Relay;
    use crate::transport::memory::MemoryTransport;
    use mirrordom_core::{Path, ReadyState};
    use std::sync::Arc;

    fn parse(markup: &str) -> Document {
        Document::parse(markup).unwrap()
    }

    fn broadcaster() -> Broadcaster<MemoryTransport> {
        let relay = Arc::new(Relay::in_memory());
        Broadcaster::new(MemoryTransport::new(relay), BroadcasterConfig::default())
    }

    fn with_frame(outer: &str, inner: &str) -> Document {
        let mut doc = parse(outer);
        let body = doc.body().unwrap();
        let iframe = doc.children(body)[0];
        doc.frame_mut(iframe).unwrap().load(parse(inner));
        doc
    }

    #[test]
    fn test_first_round_sends_new_instance() {
        let mut b = broadcaster();
        let doc = parse("<html><head/><body><p>a</p></body></html>");
        let request = b.prepare_round(&doc).unwrap().unwrap();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].kind(), "new_instance");
        assert!(b.is_sending());
    }

    #[test]
    fn test_in_flight_tick_is_noop() {
        let mut b = broadcaster();
        let doc = parse("<html><head/><body/></html>");
        assert!(b.prepare_round(&doc).unwrap().is_some());
        assert!(b.prepare_round(&doc).unwrap().is_none());
        b.finish_round(SendUpdateResponse::default());
        assert!(b.prepare_round(&doc).unwrap().is_some());
    }

    #[test]
    fn test_loading_document_skipped() {
        let mut b = broadcaster();
        let mut doc = parse("<html><head/><body/></html>");
        doc.set_ready_state(ReadyState::Loading);
        assert!(b.prepare_round(&doc).unwrap().is_none());
        assert!(!b.is_sending());
    }

    #[test]
    fn test_unchanged_round_sends_nothing() {
        let mut b = broadcaster();
        let doc = parse("<html><head/><body><p>a</p></body></html>");
        b.prepare_round(&doc).unwrap();
        b.finish_round(SendUpdateResponse::default());
        let request = b.prepare_round(&doc).unwrap().unwrap();
        assert!(request.messages.is_empty());
    }

    #[test]
    fn test_diffs_after_change() {
        let mut b = broadcaster();
        let mut doc = parse("<html><head/><body><p>a</p></body></html>");
        b.prepare_round(&doc).unwrap();
        b.finish_round(SendUpdateResponse::default());

        let body = doc.body().unwrap();
        let p = doc.create_element("p", mirrordom_core::DocType::Html);
        doc.append_child(body, p);
        let request = b.prepare_round(&doc).unwrap().unwrap();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].kind(), "diffs");
    }

    #[test]
    fn test_frames_discovered_outer_first() {
        let mut b = broadcaster();
        let doc = with_frame(
            "<html><head/><body><iframe/></body></html>",
            "<html><head/><body><p>inner</p></body></html>",
        );
        let request = b.prepare_round(&doc).unwrap().unwrap();
        let frame = FramePath::main().child_scope(&Path::new(vec![1, 0]));
        let frames: Vec<&FramePath> = request.messages.iter().map(FrameMessage::frame).collect();
        assert_eq!(frames, vec![&FramePath::main(), &frame]);
        assert_eq!(request.iframes, vec![frame]);
    }

    #[test]
    fn test_loading_frame_reported_not_diffed() {
        let mut b = broadcaster();
        let mut doc = parse("<html><head/><body><iframe/></body></html>");
        let body = doc.body().unwrap();
        let iframe = doc.children(body)[0];
        doc.frame_mut(iframe).unwrap().reset_to_blank("about:blank");

        let request = b.prepare_round(&doc).unwrap().unwrap();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.iframes.len(), 1);
    }

    #[test]
    fn test_frame_navigation_sends_new_page() {
        let mut b = broadcaster();
        let mut doc = with_frame(
            "<html><head/><body><iframe/></body></html>",
            "<html><head/><body/></html>",
        );
        b.prepare_round(&doc).unwrap();
        b.finish_round(SendUpdateResponse::default());

        let body = doc.body().unwrap();
        let iframe = doc.children(body)[0];
        doc.frame_mut(iframe).unwrap().load(parse("<html><head/><body><p>next</p></body></html>"));
        let request = b.prepare_round(&doc).unwrap().unwrap();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].kind(), "new_page");
    }

    #[test]
    fn test_reset_request_resends_everything() {
        let mut b = broadcaster();
        let doc = parse("<html><head/><body/></html>");
        b.prepare_round(&doc).unwrap();
        b.finish_round(SendUpdateResponse {
            last_change_id: Some(0),
            reset_requested: true,
        });
        let request = b.prepare_round(&doc).unwrap().unwrap();
        assert_eq!(request.messages[0].kind(), "new_page");
    }

    #[tokio::test]
    async fn test_transport_failure_schedules_resend() {
        let mut b = broadcaster();
        let doc = parse("<html><head/><body/></html>");
        b.poll(&doc).await.unwrap();

        b.transport().disconnect();
        assert!(matches!(b.poll(&doc).await, Err(SyncError::Transport(_))));
        assert!(!b.is_sending());

        b.transport().reconnect();
        let report = b.poll(&doc).await.unwrap().unwrap();
        assert_eq!(report.messages, 1);
    }
}
