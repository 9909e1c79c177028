//! The relay: the party between one broadcaster and any number of viewers.
//!
//! The relay keeps a change log per scope in a [`ChangeStore`], sanitises
//! everything it stores, and answers `send_update` and `get_update`.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, info, warn};

use mirrordom_core::{DiffRecord, FramePath};
use mirrordom_store::{
    sanitise_html, sanitise_records, ChangeStore, ErrorCode, MemoryStore, StoreError,
};

use crate::error::{Result, SyncError};
use crate::messages::{
    FrameMessage, GetUpdateRequest, GetUpdateResponse, InitData, SendUpdateRequest,
    SendUpdateResponse, GET_UPDATE, SEND_UPDATE,
};

/// Relay state over a change store.
pub struct Relay<S: ChangeStore = MemoryStore> {
    store: S,
    /// Set when a recovering viewer found no main-scope reset to apply.
    reset_requested: AtomicBool,
}

impl Relay<MemoryStore> {
    /// A relay over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: ChangeStore> Relay<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            reset_requested: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether a reset request is waiting for the broadcaster.
    pub fn reset_pending(&self) -> bool {
        self.reset_requested.load(Ordering::SeqCst)
    }

    /// Dispatch a JSON call by method name.
    pub async fn handle(&self, method: &str, args: Value) -> Result<Value> {
        match method {
            GET_UPDATE => {
                let request: GetUpdateRequest = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.get_update(request).await?)?)
            }
            SEND_UPDATE => {
                let request: SendUpdateRequest = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.send_update(request).await?)?)
            }
            other => Err(SyncError::InvalidMessage(format!("unknown method {}", other))),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Broadcaster side
    // ─────────────────────────────────────────────────────────────────────────

    /// Store every message, then drop logs of frames no longer present.
    pub async fn send_update(&self, request: SendUpdateRequest) -> Result<SendUpdateResponse> {
        request.validate_limits().map_err(|reason| SyncError::Server {
            code: ErrorCode::MessageTooLarge,
            message: reason.to_string(),
        })?;

        for message in request.messages {
            match message {
                FrameMessage::NewInstance { frame, data } => {
                    info!(frame = %frame, "new scope instance");
                    self.init_frame(&frame, data).await?;
                }
                FrameMessage::NewPage { frame, data } => {
                    info!(frame = %frame, url = ?data.url, "scope loaded a new page");
                    self.init_frame(&frame, data).await?;
                }
                FrameMessage::Diffs { frame, diffs } => {
                    self.add_diffs(&frame, diffs).await?;
                }
            }
        }
        self.update_frames(&request.iframes).await?;

        Ok(SendUpdateResponse {
            last_change_id: self.store.last_change_id().await?,
            reset_requested: self.reset_requested.swap(false, Ordering::SeqCst),
        })
    }

    /// Start the log of `frame` over from a full document.
    pub async fn init_frame(&self, frame: &FramePath, data: InitData) -> Result<u64> {
        let html = match sanitise_html(&data.html) {
            Ok(html) => html,
            Err(err) => {
                warn!(frame = %frame, error = %err, "rejecting unparsable document");
                let id = self
                    .store
                    .record_error(frame, ErrorCode::InvalidMessage, err.to_string())
                    .await?;
                self.store.remove_descendants(frame).await?;
                return Ok(id);
            }
        };
        let props = sanitise_records(data.props);
        let id = self.store.init_frame(frame, html, props, data.url).await?;
        let removed = self.store.remove_descendants(frame).await?;
        if !removed.is_empty() {
            debug!(frame = %frame, count = removed.len(), "dropped nested scopes");
        }
        Ok(id)
    }

    /// Append a diff set to the log of `frame`.
    ///
    /// Diffs for a scope without a log turn that scope's log into an
    /// `UnknownScope` error, so viewers learn they cannot follow it.
    pub async fn add_diffs(&self, frame: &FramePath, diffs: Vec<DiffRecord>) -> Result<u64> {
        let diffs = sanitise_records(diffs);
        match self.store.add_diffs(frame, diffs).await {
            Ok(id) => Ok(id),
            Err(StoreError::UnknownFrame(_)) => {
                warn!(frame = %frame, "couldn't find frame for diffs");
                Ok(self
                    .store
                    .record_error(
                        frame,
                        ErrorCode::UnknownScope,
                        format!("no change log for frame {}", frame),
                    )
                    .await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Keep only the logs of `active` frames and the main scope.
    pub async fn update_frames(&self, active: &[FramePath]) -> Result<()> {
        let dropped = self.store.update_frames(active).await?;
        for frame in dropped {
            debug!(frame = %frame, "frame went away");
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Viewer side
    // ─────────────────────────────────────────────────────────────────────────

    /// Everything since `change_id`, outer scopes first.
    ///
    /// A recovering viewer only gets changes once the main scope has been
    /// reset at or after its watermark; until then the relay asks the
    /// broadcaster to resend everything.
    pub async fn get_update(&self, request: GetUpdateRequest) -> Result<GetUpdateResponse> {
        let last_change_id = self.store.last_change_id().await?;
        if request.init_html_required
            && !self.store.has_main_reset_since(request.change_id).await?
        {
            if !self.reset_requested.swap(true, Ordering::SeqCst) {
                info!(change_id = ?request.change_id, "viewer needs a reset, asking broadcaster");
            }
            return Ok(GetUpdateResponse {
                changesets: None,
                last_change_id,
            });
        }

        let changesets = self.store.changes_since(request.change_id).await?;
        Ok(GetUpdateResponse {
            changesets: Some(changesets),
            last_change_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrordom_core::{DocType, Path};

    fn init(html: &str) -> InitData {
        InitData {
            html: html.into(),
            props: vec![],
            url: None,
        }
    }

    fn deleted() -> DiffRecord {
        DiffRecord::Deleted {
            path: Path::new(vec![1, 0]),
            doc_type: DocType::Html,
        }
    }

    fn frame() -> FramePath {
        FramePath::main().child_scope(&Path::new(vec![1, 0]))
    }

    #[tokio::test]
    async fn test_init_sanitises() {
        let relay = Relay::in_memory();
        relay
            .init_frame(
                &FramePath::main(),
                init("<html><head><script>x()</script></head><body onload=\"y()\"/></html>"),
            )
            .await
            .unwrap();
        let log = relay.store().changelog(&FramePath::main()).await.unwrap().unwrap();
        assert_eq!(log.init_html.as_deref(), Some("<html><head/><body/></html>"));
    }

    #[tokio::test]
    async fn test_unknown_frame_records_error() {
        let relay = Relay::in_memory();
        relay.add_diffs(&frame(), vec![deleted()]).await.unwrap();

        let update = relay.get_update(GetUpdateRequest::default()).await.unwrap();
        let changesets = update.changesets.unwrap();
        assert_eq!(changesets.len(), 1);
        assert_eq!(changesets[0].1.error, Some(ErrorCode::UnknownScope));
    }

    #[tokio::test]
    async fn test_init_html_required_withholds_and_requests_reset() {
        let relay = Relay::in_memory();
        relay.init_frame(&FramePath::main(), init("<html/>")).await.unwrap();
        relay.add_diffs(&FramePath::main(), vec![deleted()]).await.unwrap();

        let update = relay
            .get_update(GetUpdateRequest {
                change_id: Some(2),
                init_html_required: true,
            })
            .await
            .unwrap();
        assert!(update.changesets.is_none());
        assert_eq!(update.last_change_id, Some(1));
        assert!(relay.reset_pending());

        let response = relay.send_update(SendUpdateRequest::default()).await.unwrap();
        assert!(response.reset_requested);
        let response = relay.send_update(SendUpdateRequest::default()).await.unwrap();
        assert!(!response.reset_requested);
    }

    #[tokio::test]
    async fn test_init_html_required_served_after_reset() {
        let relay = Relay::in_memory();
        relay.init_frame(&FramePath::main(), init("<html/>")).await.unwrap();
        relay.add_diffs(&FramePath::main(), vec![deleted()]).await.unwrap();
        relay.init_frame(&FramePath::main(), init("<html/>")).await.unwrap();

        let update = relay
            .get_update(GetUpdateRequest {
                change_id: Some(2),
                init_html_required: true,
            })
            .await
            .unwrap();
        let changesets = update.changesets.unwrap();
        assert!(changesets[0].1.init_html.is_some());
        assert!(!relay.reset_pending());
    }

    #[tokio::test]
    async fn test_send_update_orders_and_prunes() {
        let relay = Relay::in_memory();
        let request = SendUpdateRequest {
            messages: vec![
                FrameMessage::NewInstance {
                    frame: FramePath::main(),
                    data: init("<html/>"),
                },
                FrameMessage::NewInstance {
                    frame: frame(),
                    data: init("<html/>"),
                },
            ],
            iframes: vec![frame()],
        };
        let response = relay.send_update(request).await.unwrap();
        assert_eq!(response.last_change_id, Some(1));
        assert_eq!(relay.store().frames().await.unwrap().len(), 2);

        relay.send_update(SendUpdateRequest::default()).await.unwrap();
        assert_eq!(relay.store().frames().await.unwrap(), vec![FramePath::main()]);
    }

    #[tokio::test]
    async fn test_main_reset_drops_nested_logs() {
        let relay = Relay::in_memory();
        relay.init_frame(&FramePath::main(), init("<html/>")).await.unwrap();
        relay.init_frame(&frame(), init("<html/>")).await.unwrap();
        relay.init_frame(&FramePath::main(), init("<html/>")).await.unwrap();
        assert_eq!(relay.store().frames().await.unwrap(), vec![FramePath::main()]);
    }

    #[tokio::test]
    async fn test_limits_rejected() {
        let relay = Relay::in_memory();
        let request = SendUpdateRequest {
            messages: vec![],
            iframes: vec![frame(); crate::messages::limits::MAX_ACTIVE_FRAMES + 1],
        };
        let err = relay.send_update(request).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Server {
                code: ErrorCode::MessageTooLarge,
                ..
            }
        ));
    }
}
