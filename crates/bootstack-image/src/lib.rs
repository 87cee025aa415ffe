//! # bootstack-image
//!
//! Container image and layer management for bootstack.
//!
//! Handles:
//! - **References**: `name[:tag][@sha256:digest]` parsing.
//! - **Layers**: deterministic gzip tar diffs, snapshots, and extraction.
//! - **Storage**: content-addressed layer store and stack materialization.
//! - **Sources**: `file://`, `tar://`, and digest-pinned `https://` bases.
//! - **Hashing**: SHA-256 content verification.
//! - **Config**: the runtime configuration attached to an image.
//! - **Registry**: local image catalog keyed by reference.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod hash;
pub mod layer;
pub mod reference;
pub mod registry;
pub mod source;
pub mod storage;
