pub mod catalog;
pub mod track;

pub use catalog::Catalog;
pub use track::{JingleType, LicenseType, Track, TrackCategory};
