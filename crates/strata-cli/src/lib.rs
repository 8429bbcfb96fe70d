pub mod commands;
pub mod error;
pub mod live;
pub mod output;

pub use commands::{AnalyzeCommand, DraftCommand, RewriteCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, truncate_string};
