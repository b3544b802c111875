#![forbid(unsafe_code)]

//! Sign-off daemon: resolves CI state of contributions, observes triggered
//! builds and comments tracker tickets with their possible blockers.

pub mod aggregate;
pub mod catalog;
pub mod collab;
pub mod config;
pub mod db;
pub mod history;
pub mod http;
pub mod observation;
mod observer;
pub mod remote;
pub mod resolver;
pub mod service;
pub mod visa;

pub use observer::BUILDS_CANCELLED;
