//! Background Tasks Module
//!
//! Contains background tasks that run alongside request handling.
//!
//! # Tasks
//! - Cache reconnect: re-establishes the cache connection after a failure

mod reconnect;

pub use reconnect::spawn_reconnect_task;
