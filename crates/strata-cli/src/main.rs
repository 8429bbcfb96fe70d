use std::path::PathBuf;

use clap::{Parser, Subcommand};
use strata::client::StrataClient;
use strata::config::Config;
use strata_cli::commands::{AnalyzeCommand, Context, DraftCommand, RewriteCommand};
use strata_cli::error::CliResult;
use strata_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "strata-cli")]
#[command(about = "Strata CLI - stream tender analysis and proposal drafts from a Strata server")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output the final result as JSON")]
    pub json: bool,

    #[clap(
        long,
        short = 's',
        global = true,
        default_value = "http://localhost:5000",
        help = "Base URL of the Strata server"
    )]
    pub server: String,

    #[clap(long, global = true, help = "Abort on malformed frames instead of skipping them")]
    pub strict: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Analyze a tender document")]
    Analyze(AnalyzeCommand),

    #[clap(about = "Draft a proposal section")]
    Draft(DraftCommand),

    #[clap(about = "Rewrite a passage of a draft")]
    Rewrite(RewriteCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut stream = Config::load(cli.config.as_deref())?.stream;
    if cli.strict {
        stream.strict_frames = true;
    }

    let ctx = Context {
        client: StrataClient::new(&cli.server)?,
        stream,
    };

    match &cli.command {
        Command::Analyze(cmd) => cmd.execute(&ctx, format).await,
        Command::Draft(cmd) => cmd.execute(&ctx, format).await,
        Command::Rewrite(cmd) => cmd.execute(&ctx, format).await,
    }
}
