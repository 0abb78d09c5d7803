pub mod client;
pub mod sync;

pub use client::{BackendConfig, RestStore};
pub use sync::{PlaybackSnapshot, PlaybackStore, PlaybackSync, PlaybackUpdate};
