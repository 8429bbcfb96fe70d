pub mod analyze;
pub mod draft;
pub mod rewrite;

pub use analyze::AnalyzeCommand;
pub use draft::DraftCommand;
pub use rewrite::RewriteCommand;

use std::path::Path;

use comfy_table::Table;
use strata::client::StrataClient;
use strata::config::StreamConfig;
use strata::consumer::ConsumeOutcome;
use strata::protocol::{Extraction, ExtractionFailure};

use crate::error::CliResult;
use crate::output::{OutputFormat, extraction_json};

/// What every command needs to talk to the server
pub struct Context {
    pub client: StrataClient,
    pub stream: StreamConfig,
}

fn read_text(path: &Path, what: &str) -> CliResult<String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {what} file {}: {e}", path.display()))?;
    if text.trim().is_empty() {
        return Err(format!("{what} file {} is empty", path.display()).into());
    }
    Ok(text)
}

/// Print the end of a session. `render` turns a parsed block into tables.
fn report<F>(outcome: ConsumeOutcome, format: OutputFormat, render: F) -> CliResult<()>
where
    F: FnOnce(&serde_json::Value) -> Vec<(&'static str, Table)>,
{
    let (extraction, complete) = match outcome {
        ConsumeOutcome::Cancelled => {
            eprintln!("Cancelled.");
            return Ok(());
        }
        ConsumeOutcome::Completed {
            extraction,
            complete,
        } => (extraction, complete),
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&extraction_json(&extraction, complete))?
            );
        }
        OutputFormat::Table => {
            if !complete {
                eprintln!("Warning: the stream ended before the server signalled completion");
            }
            print_tables(&extraction, render);
        }
    }
    Ok(())
}

fn print_tables<F>(extraction: &Extraction, render: F)
where
    F: FnOnce(&serde_json::Value) -> Vec<(&'static str, Table)>,
{
    match &extraction.result {
        Ok(value) => {
            for (title, table) in render(value) {
                println!("\n{title}");
                println!("{table}");
            }
        }
        Err(ExtractionFailure::NoBlockFound) => {
            eprintln!("\nNo structured block found in the response; the text above is all there is.");
        }
        Err(ExtractionFailure::InvalidJson(detail)) => {
            eprintln!("\nThe structured block could not be parsed: {detail}");
        }
    }
}
