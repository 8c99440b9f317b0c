//! HTTP control surface: REST endpoints plus the SSE event stream.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{run, AppContext};
