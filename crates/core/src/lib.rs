#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and pure logic for the sign-off service: branch naming, ticket
//! matching, blocker counting and tracker comment rendering.

pub mod api;
pub mod branch;
pub mod comment;
pub mod model;
pub mod ticket;

mod util;

pub use util::{format_timestamp, new_ulid, now_ms};
