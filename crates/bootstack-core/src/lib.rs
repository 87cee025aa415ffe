//! # bootstack-core
//!
//! Low-level isolation primitives shared by the image builder and the
//! container runtime.
//!
//! This crate provides:
//! - **Filesystem**: tree copies that overwrite like a layer overlay, and
//!   an access audit for a non-root identity.
//! - **Process**: launching a command inside a rootfs, either chrooted
//!   with the runtime identity applied or directly on the host.
//!
//! The only unsafe code is the `pre_exec` hook that enters the rootfs,
//! documented with `// SAFETY:` at the call site.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod process;
