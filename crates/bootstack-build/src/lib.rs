//! # bootstack-build
//!
//! Turns a build descriptor and a build context into a registered image.
//!
//! The build is an ordered, fail-fast pipeline of five stages:
//!
//! 1. **base**: resolve the base image and unpack its layers.
//! 2. **dependencies**: copy the manifest in and run the installer.
//! 3. **sources**: overlay the build context.
//! 4. **identity**: record the non-root runtime identity.
//! 5. **entry**: record the foreground command.
//!
//! Stages that change files are snapshotted before and after; their diff
//! becomes one deterministic layer.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod descriptor;
pub mod error;
pub mod installer;
pub mod manifest;
pub mod pipeline;
pub mod stage;
pub mod stages;

pub use error::{BuildError, Result};
pub use pipeline::{BuildOptions, BuildOutput, BuildReport, InstallerKind, build_image};
