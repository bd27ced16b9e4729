//! Command-line interface for the analyst panel

mod render;

use anyhow::{Context as _, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use panel_core::SignalLabels;
use panel_engine::{AnalysisOrchestrator, AnalysisRequest, EngineConfig};
use panel_server::{AppState, build_runtime};
use panel_utils::{Config, LogFormat, RuntimeKind, init_tracing};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "panel")]
#[command(about = "Ask a panel of investor personas about a few tickers", long_about = None)]
struct Args {
    /// Log format, overrides PANEL_LOG_FORMAT (pretty or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Agent runtime, overrides PANEL_RUNTIME (rules or llm)
        #[arg(long)]
        runtime: Option<RuntimeKind>,
    },

    /// Analyze tickers and print the panel's signals
    Analyze(AnalyzeArgs),

    /// List the analyst catalog
    Analysts,
}

#[derive(ClapArgs, Debug)]
struct AnalyzeArgs {
    /// Up to three symbols, comma or space separated
    #[arg(short, long)]
    tickers: String,

    /// Analyst ids in display order
    #[arg(short, long, value_delimiter = ',', required = true)]
    analysts: Vec<String>,

    /// Debate toward consensus instead of a single fan-out
    #[arg(long)]
    round_table: bool,

    /// Debate rounds after the opening round
    #[arg(long, requires = "round_table")]
    max_rounds: Option<u32>,

    /// Window start (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// Window end (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Print the raw JSON response
    #[arg(long)]
    json: bool,

    /// Agent runtime, overrides PANEL_RUNTIME (rules or llm)
    #[arg(long)]
    runtime: Option<RuntimeKind>,

    /// Signal labels, overrides PANEL_SIGNAL_LABELS (chinese or english)
    #[arg(long)]
    labels: Option<SignalLabels>,
}

impl AnalyzeArgs {
    fn request(&self) -> AnalysisRequest {
        let mut request = AnalysisRequest::new(self.tickers.clone(), &self.analysts);
        request.start_date.clone_from(&self.start_date);
        request.end_date.clone_from(&self.end_date);
        request.max_rounds = self.max_rounds;
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(format) = args.log_format {
        config.log_format = format;
    }
    init_tracing(config.log_format);

    match args.command {
        Command::Serve {
            host,
            port,
            runtime,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(runtime) = runtime {
                config.runtime = runtime;
            }
            serve(&config).await
        }
        Command::Analyze(analyze_args) => analyze(&config, &analyze_args).await,
        Command::Analysts => {
            println!("{}", render::analysts_table());
            Ok(())
        }
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let engine = EngineConfig::from_env()?;
    let runtime = build_runtime(config.runtime).context("failed to build agent runtime")?;
    info!(
        environment = %config.environment,
        runtime = %config.runtime,
        "Starting analyst panel"
    );

    let state = AppState::new(runtime, engine);
    panel_server::serve(&config.bind_addr(), state).await?;
    Ok(())
}

async fn analyze(config: &Config, args: &AnalyzeArgs) -> anyhow::Result<()> {
    let mut engine = EngineConfig::from_env()?;
    if let Some(labels) = args.labels {
        engine.signal_labels = labels;
    }
    let runtime = build_runtime(args.runtime.unwrap_or(config.runtime))
        .context("failed to build agent runtime")?;
    let orchestrator = AnalysisOrchestrator::new(runtime, engine);
    let request = args.request();

    // Dropping the run future on Ctrl-C cancels its outstanding tasks
    let output = if args.round_table {
        let response = tokio::select! {
            response = orchestrator.round_table(&request) => response?,
            _ = tokio::signal::ctrl_c() => bail!("interrupted"),
        };
        if args.json {
            serde_json::to_string_pretty(&response)?
        } else {
            render::round_table(&response)
        }
    } else {
        let response = tokio::select! {
            response = orchestrator.analyze(&request) => response?,
            _ = tokio::signal::ctrl_c() => bail!("interrupted"),
        };
        if args.json {
            serde_json::to_string_pretty(&response)?
        } else {
            render::analyses(&response)
        }
    };

    println!("{output}");
    Ok(())
}
