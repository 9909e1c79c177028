//! Transport abstraction for the session protocol.
//!
//! A transport carries one JSON request to the relay and brings back one
//! JSON response. Implementations may use HTTP long polling, WebSockets
//! or anything else that can do request/response.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::SyncError;
use crate::messages::{
    GetUpdateRequest, GetUpdateResponse, SendUpdateRequest, SendUpdateResponse, GET_UPDATE,
    SEND_UPDATE,
};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Transport trait for reaching the relay.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Broadcaster to relay.
    async fn push(&self, method: &str, args: Value) -> Result<Value>;

    /// Viewer to relay.
    async fn pull(&self, method: &str, args: Value) -> Result<Value>;
}

/// Typed calls on top of a [`Transport`].
pub trait TransportExt: Transport {
    /// Poll the relay for changes.
    fn get_update(
        &self,
        request: &GetUpdateRequest,
    ) -> impl std::future::Future<Output = Result<GetUpdateResponse>> + Send;

    /// Push scope messages to the relay.
    fn send_update(
        &self,
        request: &SendUpdateRequest,
    ) -> impl std::future::Future<Output = Result<SendUpdateResponse>> + Send;
}

impl<T: Transport + ?Sized> TransportExt for T {
    async fn get_update(&self, request: &GetUpdateRequest) -> Result<GetUpdateResponse> {
        let args = encode(request)?;
        decode(self.pull(GET_UPDATE, args).await?)
    }

    async fn send_update(&self, request: &SendUpdateRequest) -> Result<SendUpdateResponse> {
        let args = encode(request)?;
        decode(self.push(SEND_UPDATE, args).await?)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn push(&self, method: &str, args: Value) -> Result<Value> {
        (**self).push(method, args).await
    }

    async fn pull(&self, method: &str, args: Value) -> Result<Value> {
        (**self).pull(method, args).await
    }
}

/// A simple in-memory transport.
///
/// Routes every call to a shared [`Relay`](crate::Relay), passing requests
/// and responses through their JSON text form like a real wire would.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    use mirrordom_store::{ChangeStore, MemoryStore};

    use crate::relay::Relay;

    /// In-memory transport implementation.
    pub struct MemoryTransport<S: ChangeStore = MemoryStore> {
        relay: Arc<Relay<S>>,
        connected: AtomicBool,
        calls: AtomicU64,
    }

    impl<S: ChangeStore> MemoryTransport<S> {
        /// Create a transport connected to `relay`.
        pub fn new(relay: Arc<Relay<S>>) -> Self {
            Self {
                relay,
                connected: AtomicBool::new(true),
                calls: AtomicU64::new(0),
            }
        }

        pub fn relay(&self) -> &Arc<Relay<S>> {
            &self.relay
        }

        /// Make every following call fail until [`MemoryTransport::reconnect`].
        pub fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        pub fn reconnect(&self) {
            self.connected.store(true, Ordering::SeqCst);
        }

        /// Number of calls that reached the relay.
        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }

        async fn call(&self, method: &str, args: Value) -> Result<Value> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(SyncError::Transport("relay unreachable".into()));
            }
            let args = wire(&args)?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self.relay.handle(method, args).await?;
            wire(&response)
        }
    }

    fn wire(value: &Value) -> Result<Value> {
        let text = serde_json::to_string(value)
            .map_err(|e| SyncError::Transport(format!("encode failed: {}", e)))?;
        serde_json::from_str(&text).map_err(|e| SyncError::Transport(format!("decode failed: {}", e)))
    }

    #[async_trait]
    impl<S: ChangeStore> Transport for MemoryTransport<S> {
        async fn push(&self, method: &str, args: Value) -> Result<Value> {
            self.call(method, args).await
        }

        async fn pull(&self, method: &str, args: Value) -> Result<Value> {
            self.call(method, args).await
        }
    }
}
