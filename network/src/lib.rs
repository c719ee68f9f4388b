// Request pipeline
// Non-blocking listener, request queue, worker dispatch, bulk writer

pub mod bulk_writer;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod queue;
pub mod service;
pub mod wire;

pub use bulk_writer::*;
pub use client::*;
pub use dispatcher::*;
pub use error::*;
pub use listener::*;
pub use queue::*;
pub use service::*;
pub use wire::*;
