//! # Belfry Audio Player (belfry-ap)
//!
//! Facility audio-cue daemon: a weekly schedule automaton drives bells,
//! announcements and break music through a three-lane priority arbiter
//! (bell > announcement > music), with a separate manually-operated player
//! and an HTTP/SSE control interface.

pub mod api;
pub mod app;
pub mod audio;
pub mod player;
pub mod scheduler;
pub mod services;
pub mod tts;

pub use app::{App, AppBackends};
