//! Application-level orchestration.
//!
//! This module owns the job lifecycle (start, cancel, completion), the deferred
//! action mailbox, status polling, and the close handshake. UI/CLI layers send
//! [`UiCommand`]s into the controller and render the events it emits.

mod controller;
mod lifecycle;
mod mailbox;
mod poller;
mod post_process;

pub(crate) use controller::{run_controller, Session, UiCommand};
pub(crate) use poller::DEFAULT_CADENCE;
