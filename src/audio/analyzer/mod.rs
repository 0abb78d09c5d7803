pub mod beatgrid;
pub mod quantize;
pub mod spectrum;

pub use quantize::{quantize, BeatGrid, GridResolution, QuantizeSettings};
pub use spectrum::{analyze_frequency_bands, AnalysisNode, FrequencyBands, SpectrumAnalyser};
