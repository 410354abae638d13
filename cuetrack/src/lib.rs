//! Normalized-time event scheduling for animation playback states.
//!
//! A [`Sequence`] keys callbacks to normalized times (`time / length`). An [`EventScheduler`]
//! advances registered [`PlaybackState`]s and fires each event once per crossing of its time,
//! handling looping, reversed playback and zero-length states. No pose evaluation is performed.

#![forbid(unsafe_code)]

mod error;
mod event;
mod runtime;
mod sequence;

#[cfg(feature = "json")]
pub mod json;

pub use error::*;
pub use event::*;
pub use runtime::*;
pub use sequence::*;

#[cfg(test)]
mod sequence_tests;

#[cfg(test)]
mod event_tests;
