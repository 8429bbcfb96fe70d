use clap::Parser;
use std::path::PathBuf;
use strata::analysis::TenderAnalysis;
use strata::task::StreamTask;

use super::{Context, read_text, report};
use crate::error::CliResult;
use crate::live::run_live;
use crate::output::{OutputFormat, analysis_tables, object_table};

#[derive(Parser)]
pub struct AnalyzeCommand {
    #[clap(help = "File containing the extracted tender text")]
    pub file: PathBuf,
}

impl AnalyzeCommand {
    pub async fn execute(&self, ctx: &Context, format: OutputFormat) -> CliResult<()> {
        let text = read_text(&self.file, "Tender")?;
        let task = StreamTask::TenderAnalysis { text };

        let outcome = run_live(&ctx.client, &ctx.stream, &task, format).await?;
        report(outcome, format, |value| match TenderAnalysis::from_value(value) {
            Some(analysis) => analysis_tables(&analysis),
            None => vec![("Findings", object_table(value))],
        })
    }
}
