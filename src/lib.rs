//! podwright - provisions isolated step-execution pods on Kubernetes
//!
//! An execution unit is a set of steps that run side by side in one pod. A
//! control container drives the steps over loopback ports, a bootstrap init
//! container installs the step runner, and every object created for the unit
//! carries the unit label so it can be reclaimed afterward.
//!
//! # Crates
//!
//! - [`common`] - unit declarations, configuration, naming, errors, telemetry
//! - [`pod`] - pure pod construction: ports, containers, volumes, assembly
//! - [`controller`] - cluster client, secret provisioning, cleanup,
//!   orchestration and event watching

#![deny(missing_docs)]

pub use podwright_common as common;
pub use podwright_controller as controller;
pub use podwright_pod as pod;

pub use podwright_common::{Error, Result};
