//! # MirrorDom Testkit
//!
//! Testing utilities for MirrorDom.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known diffs with their exact wire form
//! - **Generators**: Proptest strategies for trees and edit scripts
//! - **Fixtures**: A broadcaster and viewer wired to one in-memory relay
//!
//! ## Golden Vectors
//!
//! Golden vectors pin the differ's output and the record encoding:
//!
//! ```rust
//! use mirrordom_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, actual) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, actual);
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use mirrordom_testkit::generators::{apply_mutation, body_spec, mutations, render_page};
//!
//! proptest! {
//!     #[test]
//!     fn edits_parse(body in body_spec(), script in mutations(4)) {
//!         let mut doc = mirrordom_core::Document::parse(&render_page(&body)).unwrap();
//!         for m in &script {
//!             apply_mutation(&mut doc, m);
//!         }
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up a mirroring session:
//!
//! ```rust,no_run
//! use mirrordom_testkit::fixtures::{page, MirrorFixture};
//!
//! async fn example() {
//!     let mut fixture = MirrorFixture::new(page("<p>hello</p>"));
//!     fixture.sync().await.unwrap();
//!     fixture.assert_converged();
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{page, parse, MirrorFixture};
