//! # MirrorDom Store
//!
//! Change log storage for the MirrorDom relay. Provides a trait-based
//! interface for per-scope change logs with an in-memory implementation,
//! plus the sanitiser every stored document and diff passes through.
//!
//! ## Overview
//!
//! The relay keeps one [`Changelog`] per scope (the main document or one
//! frame document). Each log starts from a full sanitised document and
//! grows by diff sets stamped with ids from one shared counter. Viewers
//! read everything since their next expected id.
//!
//! ## Key Types
//!
//! - [`ChangeStore`] - The async trait for all change log operations
//! - [`MemoryStore`] - In-memory storage
//! - [`Changelog`] - Log of one scope
//! - [`ChangeEntry`] - What a reader receives for one scope
//! - [`ErrorCode`] - Failure codes carried on the wire
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mirrordom_core::FramePath;
//! use mirrordom_store::{ChangeStore, MemoryStore};
//!
//! async fn example() {
//!     let store = MemoryStore::new();
//!     let main = FramePath::main();
//!     store
//!         .init_frame(&main, "<html><head/><body/></html>".into(), vec![], None)
//!         .await
//!         .unwrap();
//!
//!     for (frame, entry) in store.changes_since(None).await.unwrap() {
//!         println!("{} -> {}", frame, entry.last_change_id);
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **One counter**: ids are shared by all scopes and strictly increase
//! - **Outer scopes first**: reads list a frame after the scope holding it
//! - **Sanitised at rest**: nothing executable is ever stored

pub mod changelog;
pub mod error;
pub mod memory;
pub mod sanitise;
pub mod traits;

pub use changelog::{ChangeEntry, Changelog, ChangelogError, ErrorCode};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sanitise::{sanitise_fragment, sanitise_html, sanitise_records};
pub use traits::ChangeStore;
