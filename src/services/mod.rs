//! Services that sit around the pipeline rather than inside it

pub mod format;

pub use format::OutputFormatHandler;
