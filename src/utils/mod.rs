//! Image scaling helpers shared by the pipeline stages

pub mod preprocessing;

pub use preprocessing::ImagePreprocessor;
