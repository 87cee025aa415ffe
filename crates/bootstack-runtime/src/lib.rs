//! Container lifecycle management for the bootstack runtime.
//!
//! A container is created from a registered image, has its layer stack
//! materialized into a private rootfs, and runs the image's entry command
//! as its single foreground process. It moves `Stopped -> Running ->
//! Exited` once and is never restarted.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod engine;
pub mod logs;
pub mod state;

pub use container::Container;
pub use engine::{Engine, OutputMode, RunningContainer};
