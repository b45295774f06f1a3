//! Client, input simulation, modal guard and failure capture for driving
//! the Workspace GUI through the `uitest` bridge.
//!
//! Every part talks to the outside world through one shared
//! [`command::CommandRunner`], so a whole [`context::TestContext`] can be
//! built against real tools or against a scripted stand-in.

pub mod capture;
pub mod client;
pub mod command;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod extract;
pub mod guard;
pub mod input;
mod menus;
pub mod model;
pub mod retry;
pub mod runner;
pub mod telemetry;
pub mod tree;
pub mod wm;

#[cfg(test)]
mod testing;

pub use client::WorkspaceClient;
pub use config::Config;
pub use context::TestContext;
pub use diagnostic::Diagnostic;
pub use error::{Result, UiTestError};
pub use runner::{RunOptions, RunSummary, TestCase, TestRunner};
