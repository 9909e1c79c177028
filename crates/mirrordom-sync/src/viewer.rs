//! Viewer session: poll the relay and replay change logs onto a local
//! copy of the document.
//!
//! Applying a response may have to wait for an embedded frame to finish
//! loading. The session then parks the rest of the response in an
//! awaiting state and resumes from [`Viewer::on_frame_load`].

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use mirrordom_core::filter::scope_frame_mut;
use mirrordom_core::{
    apply_diffs, apply_document, ApplyError, Document, FramePath, ReadyState, BLANK_URL,
};
use mirrordom_store::{ChangeEntry, ErrorCode};

use crate::error::Result;
use crate::messages::{GetUpdateRequest, GetUpdateResponse};
use crate::transport::{Transport, TransportExt};

/// Configuration for the viewer.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Time between polls.
    pub poll_interval: Duration,
    /// Page a frame is pointed at before its content is written.
    pub blank_url: String,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            blank_url: BLANK_URL.to_string(),
            event_capacity: 64,
        }
    }
}

/// Whether the local copy is trusted to follow the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerStatus {
    Ok,
    /// A change log could not be applied here.
    LocalError,
    /// The relay reported a scope it cannot follow.
    RemoteError,
}

/// Notifications published by the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    StatusChanged(ViewerStatus),
    /// The main scope was reset to a page at `url`.
    PageLoaded { url: String },
    /// Applying is parked until `frame` reports its load.
    AwaitingFrameLoad { frame: FramePath },
}

/// What one poll or resumption did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A poll was in flight or a frame load is awaited.
    Skipped,
    /// The relay held changes back until a main-scope reset exists.
    Withheld,
    /// Changes were dropped because the viewer is recovering.
    Ignored,
    /// Every changeset was processed.
    Applied { scopes: usize },
    /// Applying stopped to wait for `frame` to load.
    Suspended { frame: FramePath },
    /// Applying stopped on an error.
    Failed { status: ViewerStatus },
}

/// A response whose application is waiting for a frame load.
#[derive(Debug, Clone)]
pub struct PendingApply {
    changesets: Vec<(FramePath, ChangeEntry)>,
    resume: usize,
    frame: FramePath,
    last_change_id: Option<u64>,
}

impl PendingApply {
    pub fn frame(&self) -> &FramePath {
        &self.frame
    }

    /// Index of the changeset that resumes.
    pub fn resume_index(&self) -> usize {
        self.resume
    }
}

enum Step {
    Applied,
    AwaitLoad,
}

/// Viewer session state.
pub struct Viewer<T: Transport> {
    transport: T,
    config: ViewerConfig,
    document: Document,
    status: ViewerStatus,
    /// First change id not applied yet.
    next_change_id: Option<u64>,
    receiving: bool,
    pending: Option<PendingApply>,
    events: broadcast::Sender<ViewerEvent>,
}

impl<T: Transport> Viewer<T> {
    /// Create a new viewer session over an empty document.
    pub fn new(transport: T, config: ViewerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            transport,
            config,
            document: Document::html(),
            status: ViewerStatus::Ok,
            next_change_id: None,
            receiving: false,
            pending: None,
            events,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn status(&self) -> ViewerStatus {
        self.status
    }

    pub fn next_change_id(&self) -> Option<u64> {
        self.next_change_id
    }

    pub fn pending(&self) -> Option<&PendingApply> {
        self.pending.as_ref()
    }

    pub fn is_awaiting_load(&self) -> bool {
        self.pending.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.events.subscribe()
    }

    /// Run one poll: fetch, then apply.
    pub async fn poll(&mut self) -> Result<PollOutcome> {
        let Some(request) = self.prepare_poll() else {
            return Ok(PollOutcome::Skipped);
        };
        match self.transport.get_update(&request).await {
            Ok(response) => Ok(self.handle_update(response)),
            Err(err) => {
                self.receiving = false;
                Err(err)
            }
        }
    }

    /// The request for this poll, marking it in flight.
    pub fn prepare_poll(&mut self) -> Option<GetUpdateRequest> {
        if self.receiving {
            debug!("previous poll still in flight, skipping tick");
            return None;
        }
        if let Some(pending) = &self.pending {
            debug!(frame = %pending.frame, "awaiting frame load, skipping tick");
            return None;
        }
        self.receiving = true;
        Some(GetUpdateRequest {
            change_id: self.next_change_id,
            init_html_required: self.status != ViewerStatus::Ok,
        })
    }

    /// Apply the relay's answer to the in-flight poll.
    pub fn handle_update(&mut self, response: GetUpdateResponse) -> PollOutcome {
        self.receiving = false;
        let Some(changesets) = response.changesets else {
            debug!(last_change_id = ?response.last_change_id, "changes withheld");
            return PollOutcome::Withheld;
        };

        if self.status != ViewerStatus::Ok {
            let has_reset = changesets
                .iter()
                .any(|(frame, entry)| frame.is_main() && entry.init_html.is_some());
            if !has_reset {
                if let Some((frame, entry)) = changesets.iter().find(|(_, e)| e.is_error()) {
                    self.remote_error(frame, entry);
                    return PollOutcome::Failed {
                        status: self.status,
                    };
                }
                debug!(count = changesets.len(), "recovering, ignoring changes");
                return PollOutcome::Ignored;
            }
        }

        self.apply_from(changesets, 0, None, response.last_change_id)
    }

    /// Notification that the frame at `frame` finished loading.
    ///
    /// Resumes a parked response when it was waiting for this frame;
    /// otherwise does nothing and returns `None`.
    pub fn on_frame_load(&mut self, frame: &FramePath) -> Option<PollOutcome> {
        let Some(pending) = self.pending.take() else {
            warn!(frame = %frame, "frame load with nothing pending");
            return None;
        };
        if pending.frame != *frame {
            warn!(frame = %frame, expected = %pending.frame, "load of unexpected frame");
            self.pending = Some(pending);
            return None;
        }

        match scope_frame_mut(&mut self.document, frame) {
            Ok(Some(host)) => host.finish_load(),
            Ok(None) => {}
            Err(err) => {
                warn!(frame = %frame, error = %err, "loaded frame no longer resolves");
                self.set_status(ViewerStatus::LocalError);
                return Some(PollOutcome::Failed {
                    status: self.status,
                });
            }
        }

        debug!(frame = %frame, resume = pending.resume, "resuming after frame load");
        let PendingApply {
            changesets,
            resume,
            frame,
            last_change_id,
        } = pending;
        Some(self.apply_from(changesets, resume, Some(frame), last_change_id))
    }

    fn apply_from(
        &mut self,
        changesets: Vec<(FramePath, ChangeEntry)>,
        start: usize,
        fresh: Option<FramePath>,
        last_change_id: Option<u64>,
    ) -> PollOutcome {
        for index in start..changesets.len() {
            let frame = changesets[index].0.clone();
            let entry = &changesets[index].1;
            if entry.is_error() {
                self.remote_error(&frame, entry);
                return PollOutcome::Failed {
                    status: self.status,
                };
            }
            if !entry.has_content() {
                continue;
            }

            let freshly_loaded = index == start && fresh.as_ref() == Some(&frame);
            match self.apply_entry(&frame, entry, freshly_loaded) {
                Ok(Step::Applied) => {}
                Ok(Step::AwaitLoad) => {
                    debug!(frame = %frame, resume = index, "waiting for frame load");
                    let _ = self.events.send(ViewerEvent::AwaitingFrameLoad {
                        frame: frame.clone(),
                    });
                    self.pending = Some(PendingApply {
                        changesets,
                        resume: index,
                        frame: frame.clone(),
                        last_change_id,
                    });
                    return PollOutcome::Suspended { frame };
                }
                Err(err) => {
                    warn!(frame = %frame, error = %err, "couldn't apply changes, requesting reset");
                    self.set_status(ViewerStatus::LocalError);
                    return PollOutcome::Failed {
                        status: self.status,
                    };
                }
            }
        }

        if let Some(last) = last_change_id {
            self.next_change_id = Some(last + 1);
        }
        PollOutcome::Applied {
            scopes: changesets.len(),
        }
    }

    fn apply_entry(
        &mut self,
        frame: &FramePath,
        entry: &ChangeEntry,
        freshly_loaded: bool,
    ) -> std::result::Result<Step, ApplyError> {
        let blank_url = self.config.blank_url.clone();
        let host = match scope_frame_mut(&mut self.document, frame)? {
            Some(host) => host,
            None => return self.apply_main(entry),
        };

        match host.ready_state() {
            ReadyState::Uninitialized => {
                host.reset_to_blank(&blank_url);
                return Ok(Step::AwaitLoad);
            }
            ReadyState::Loading => return Ok(Step::AwaitLoad),
            ReadyState::Complete if entry.init_html.is_some() && !freshly_loaded => {
                host.reset_to_blank(&blank_url);
                return Ok(Step::AwaitLoad);
            }
            ReadyState::Complete => {}
        }

        let Some(doc) = host.document_mut() else {
            host.reset_to_blank(&blank_url);
            return Ok(Step::AwaitLoad);
        };
        if let Some(html) = &entry.init_html {
            apply_document(doc, html)?;
            doc.set_url(entry.url.clone());
        }
        if let Some(diffs) = &entry.diffs {
            apply_diffs(doc, diffs)?;
        }
        Ok(Step::Applied)
    }

    fn apply_main(&mut self, entry: &ChangeEntry) -> std::result::Result<Step, ApplyError> {
        if let Some(html) = &entry.init_html {
            apply_document(&mut self.document, html)?;
            self.document.set_url(entry.url.clone());
            if self.status != ViewerStatus::Ok {
                self.set_status(ViewerStatus::Ok);
            }
            if let Some(url) = &entry.url {
                info!(url = %url, "page loaded");
                let _ = self.events.send(ViewerEvent::PageLoaded { url: url.clone() });
            }
        }
        if let Some(diffs) = &entry.diffs {
            apply_diffs(&mut self.document, diffs)?;
        }
        Ok(Step::Applied)
    }

    fn remote_error(&mut self, frame: &FramePath, entry: &ChangeEntry) {
        let code = entry.error.unwrap_or(ErrorCode::Unknown);
        let message = entry.error_msg.as_deref().unwrap_or("");
        if self.status == ViewerStatus::RemoteError {
            debug!(frame = %frame, code = ?code, message, "relay still reports error");
        } else {
            warn!(frame = %frame, code = ?code, message, "relay reported error");
        }
        self.set_status(ViewerStatus::RemoteError);
    }

    fn set_status(&mut self, status: ViewerStatus) {
        if self.status == status {
            return;
        }
        if status == ViewerStatus::Ok {
            info!("recovered");
        }
        self.status = status;
        let _ = self.events.send(ViewerEvent::StatusChanged(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Relay;
    use crate::transport::memory::MemoryTransport;
    use mirrordom_core::{DiffRecord, DocType, Path};
    use std::sync::Arc;

    fn viewer() -> Viewer<MemoryTransport> {
        let relay = Arc::new(Relay::in_memory());
        Viewer::new(MemoryTransport::new(relay), ViewerConfig::default())
    }

    fn main_reset(html: &str, url: Option<&str>) -> (FramePath, ChangeEntry) {
        (
            FramePath::main(),
            ChangeEntry {
                init_html: Some(html.into()),
                diffs: Some(vec![]),
                url: url.map(str::to_string),
                last_change_id: 0,
                ..ChangeEntry::default()
            },
        )
    }

    fn response(changesets: Vec<(FramePath, ChangeEntry)>, last: u64) -> GetUpdateResponse {
        GetUpdateResponse {
            changesets: Some(changesets),
            last_change_id: Some(last),
        }
    }

    fn iframe() -> FramePath {
        FramePath::main().child_scope(&Path::new(vec![1, 0]))
    }

    #[test]
    fn test_main_reset_applies_and_advances() {
        let mut v = viewer();
        let mut events = v.subscribe();
        v.prepare_poll().unwrap();
        let outcome = v.handle_update(response(
            vec![main_reset(
                "<html><head/><body><p>a</p></body></html>",
                Some("http://x/"),
            )],
            4,
        ));
        assert_eq!(outcome, PollOutcome::Applied { scopes: 1 });
        assert_eq!(v.next_change_id(), Some(5));
        assert_eq!(v.document().url(), Some("http://x/"));
        assert_eq!(
            events.try_recv().unwrap(),
            ViewerEvent::PageLoaded {
                url: "http://x/".into()
            }
        );
    }

    #[test]
    fn test_bad_path_enters_local_error() {
        let mut v = viewer();
        let entry = ChangeEntry {
            diffs: Some(vec![DiffRecord::Deleted {
                path: Path::new(vec![1, 7, 2]),
                doc_type: DocType::Html,
            }]),
            last_change_id: 3,
            ..ChangeEntry::default()
        };
        let outcome = v.handle_update(response(vec![(FramePath::main(), entry)], 3));
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                status: ViewerStatus::LocalError
            }
        );
        assert_eq!(v.next_change_id(), None);
        assert!(v.prepare_poll().unwrap().init_html_required);
    }

    #[test]
    fn test_recovering_viewer_ignores_plain_diffs() {
        let mut v = viewer();
        v.set_status(ViewerStatus::LocalError);
        let entry = ChangeEntry {
            diffs: Some(vec![]),
            last_change_id: 3,
            ..ChangeEntry::default()
        };
        assert_eq!(
            v.handle_update(response(vec![(FramePath::main(), entry)], 3)),
            PollOutcome::Ignored
        );

        let outcome = v.handle_update(response(
            vec![main_reset("<html><head/><body/></html>", None)],
            5,
        ));
        assert_eq!(outcome, PollOutcome::Applied { scopes: 1 });
        assert_eq!(v.status(), ViewerStatus::Ok);
    }

    #[test]
    fn test_remote_error() {
        let mut v = viewer();
        let entry = ChangeEntry {
            error: Some(ErrorCode::UnknownScope),
            error_msg: Some("no change log".into()),
            last_change_id: 2,
            ..ChangeEntry::default()
        };
        let outcome = v.handle_update(response(vec![(iframe(), entry)], 2));
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                status: ViewerStatus::RemoteError
            }
        );
    }

    #[test]
    fn test_frame_entry_waits_for_load_once() {
        let mut v = viewer();
        let frame_entry = ChangeEntry {
            init_html: Some("<html><head/><body><p>inner</p></body></html>".into()),
            diffs: Some(vec![]),
            last_change_id: 1,
            ..ChangeEntry::default()
        };
        let outcome = v.handle_update(response(
            vec![
                main_reset("<html><head/><body><iframe/></body></html>", None),
                (iframe(), frame_entry),
            ],
            1,
        ));
        assert_eq!(outcome, PollOutcome::Suspended { frame: iframe() });
        assert_eq!(v.pending().unwrap().resume_index(), 1);
        assert!(v.prepare_poll().is_none());

        let resumed = v.on_frame_load(&iframe()).unwrap();
        assert_eq!(resumed, PollOutcome::Applied { scopes: 2 });
        assert!(v.on_frame_load(&iframe()).is_none());
        assert_eq!(v.next_change_id(), Some(2));

        let doc = mirrordom_core::filter::scope_document(v.document(), &iframe()).unwrap();
        assert_eq!(doc.text_content(doc.body().unwrap()), "inner");
    }

    #[test]
    fn test_mismatched_load_is_noop() {
        let mut v = viewer();
        let frame_entry = ChangeEntry {
            init_html: Some("<html><head/><body/></html>".into()),
            last_change_id: 1,
            ..ChangeEntry::default()
        };
        v.handle_update(response(
            vec![
                main_reset("<html><head/><body><iframe/></body></html>", None),
                (iframe(), frame_entry),
            ],
            1,
        ));
        let other = FramePath::main().child_scope(&Path::new(vec![1, 5]));
        assert!(v.on_frame_load(&other).is_none());
        assert!(v.is_awaiting_load());
    }
}
