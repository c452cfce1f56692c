pub mod config;
pub mod error;
pub mod file_config;
pub mod types;

pub use config::AppConfig;
pub use error::{TriageError, TriageResult};
pub use file_config::{ChannelsConfig, EscalationConfig, FileConfig, TriageConfig};
pub use types::*;
