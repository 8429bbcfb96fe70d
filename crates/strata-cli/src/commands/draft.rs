use clap::Parser;
use std::path::PathBuf;
use strata::task::StreamTask;

use super::{Context, read_text, report};
use crate::error::CliResult;
use crate::live::run_live;
use crate::output::{OutputFormat, object_table};

#[derive(Parser)]
pub struct DraftCommand {
    #[clap(long, short, help = "What the section should cover")]
    pub prompt: String,

    #[clap(long, help = "File with requirements or tender context for the draft")]
    pub context_file: PathBuf,
}

impl DraftCommand {
    pub async fn execute(&self, ctx: &Context, format: OutputFormat) -> CliResult<()> {
        if self.prompt.trim().is_empty() {
            return Err("Prompt must not be empty".into());
        }
        let context = read_text(&self.context_file, "Context")?;
        let task = StreamTask::Draft {
            prompt: self.prompt.clone(),
            context,
        };

        let outcome = run_live(&ctx.client, &ctx.stream, &task, format).await?;
        report(outcome, format, |value| vec![("Section", object_table(value))])
    }
}
