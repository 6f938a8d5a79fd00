pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod transform;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, RunReport, Stage};
