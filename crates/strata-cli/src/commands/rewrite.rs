use clap::Parser;
use std::path::PathBuf;
use strata::task::StreamTask;

use super::{Context, read_text, report};
use crate::error::CliResult;
use crate::live::run_live;
use crate::output::{OutputFormat, object_table};

#[derive(Parser)]
pub struct RewriteCommand {
    #[clap(long, help = "File holding the passage to rewrite")]
    pub selection_file: PathBuf,

    #[clap(long, short, help = "How the passage should change")]
    pub instruction: String,

    #[clap(long, help = "File with the surrounding draft")]
    pub context_file: Option<PathBuf>,
}

impl RewriteCommand {
    pub async fn execute(&self, ctx: &Context, format: OutputFormat) -> CliResult<()> {
        if self.instruction.trim().is_empty() {
            return Err("Instruction must not be empty".into());
        }
        let selection = read_text(&self.selection_file, "Selection")?;
        let context = match &self.context_file {
            Some(path) => Some(read_text(path, "Context")?),
            None => None,
        };
        let task = StreamTask::Rewrite {
            selection,
            instruction: self.instruction.clone(),
            context,
        };

        let outcome = run_live(&ctx.client, &ctx.stream, &task, format).await?;
        report(outcome, format, |value| vec![("Change", object_table(value))])
    }
}
