//! # streambot Robot
//!
//! A small listener-based bot runtime that plugs into the bridge as its
//! [`BotRuntime`](streambot_core::BotRuntime).
//!
//! Listeners are registered up front (`respond`, `hear`, `enter`, `leave`,
//! `topic`, `catch_all`). Each inbound message is offered to every listener;
//! the catch-all runs only when nothing else matched. Handlers answer through
//! a [`Response`], which routes back to the attached [`Adapter`](streambot_core::Adapter).

pub mod listener;
pub mod response;
pub mod robot;

pub use listener::{Handler, Listener, Matcher, RobotError};
pub use response::Response;
pub use robot::Robot;
