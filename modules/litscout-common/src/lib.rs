pub mod config;
pub mod text;
pub mod types;

pub use config::PipelineConfig;
pub use types::*;
