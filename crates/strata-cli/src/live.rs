//! Live rendering of a streaming session in the terminal

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use strata::StrataError;
use strata::client::StrataClient;
use strata::config::StreamConfig;
use strata::consumer::{ClientSession, ConsumeOutcome, DisplaySink};
use strata::task::StreamTask;

use crate::error::CliResult;
use crate::output::OutputFormat;

/// Prints new prose as it arrives and drives the stage bar
pub struct TerminalSink {
    pb: ProgressBar,
    printed: String,
    echo: bool,
}

impl TerminalSink {
    pub fn new(pb: ProgressBar, echo: bool) -> Self {
        Self {
            pb,
            printed: String::new(),
            echo,
        }
    }

    /// Part of `text` not yet on screen. A display that no longer extends what
    /// was printed starts over on a new line.
    fn unseen<'a>(&self, text: &'a str) -> (bool, &'a str) {
        match text.strip_prefix(self.printed.as_str()) {
            Some(rest) => (false, rest),
            None => (true, text),
        }
    }
}

impl DisplaySink for TerminalSink {
    fn live_text(&mut self, text: &str) {
        if !self.echo {
            self.printed = text.to_string();
            return;
        }
        let (restart, suffix) = self.unseen(text);
        if suffix.is_empty() && !restart {
            return;
        }
        self.pb.suspend(|| {
            let mut stdout = std::io::stdout().lock();
            if restart {
                let _ = writeln!(stdout);
            }
            let _ = write!(stdout, "{suffix}");
            let _ = stdout.flush();
        });
        self.printed = text.to_string();
    }

    fn stage(&mut self, index: usize, total: usize, label: &str) {
        self.pb.set_length(total as u64);
        self.pb.set_position(index as u64);
        self.pb.set_message(label.to_string());
    }
}

fn stage_bar(session: &ClientSession, format: OutputFormat) -> CliResult<ProgressBar> {
    let progress = session.progress();
    let pb = match format {
        OutputFormat::Json => ProgressBar::hidden(),
        OutputFormat::Table => ProgressBar::new(progress.total() as u64),
    };
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map_err(|e| format!("Progress bar error: {e}"))?
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(progress.label());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(pb)
}

/// Stream one task, rendering prose and stages until it ends or Ctrl+C
pub async fn run_live(
    client: &StrataClient,
    stream: &StreamConfig,
    task: &StreamTask,
    format: OutputFormat,
) -> CliResult<ConsumeOutcome> {
    let mut session = ClientSession::from_config(stream, task.kind());
    tracing::debug!(session = %session.id(), "Starting {} session", task.kind());

    let pb = stage_bar(&session, format)?;
    let mut sink = TerminalSink::new(pb.clone(), matches!(format, OutputFormat::Table));

    let cancel = session.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = client.run(task, &mut session, &mut sink).await;
    ctrl_c.abort();
    pb.finish_and_clear();

    if matches!(format, OutputFormat::Table) && !sink.printed.is_empty() {
        println!();
    }

    match result {
        Ok(outcome) => Ok(outcome),
        Err(StrataError::Stream(message)) => Err(format!("The server reported an error: {message}").into()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_suffix() {
        let mut sink = TerminalSink::new(ProgressBar::hidden(), false);
        sink.printed = "Hello ".to_string();
        assert_eq!(sink.unseen("Hello world"), (false, "world"));
        assert_eq!(sink.unseen("Goodbye"), (true, "Goodbye"));
    }

    #[test]
    fn test_silent_sink_tracks_text() {
        let mut sink = TerminalSink::new(ProgressBar::hidden(), false);
        sink.live_text("abc");
        sink.stage(2, 6, "Checking required documents");
        assert_eq!(sink.printed, "abc");
        assert_eq!(sink.pb.position(), 2);
        assert_eq!(sink.pb.length(), Some(6));
    }
}
