pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod i18n;
pub mod llm;
pub mod search;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use graph::{PlanOutcome, SearchGraph};
pub use workflow::launch;
