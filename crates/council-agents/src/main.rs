use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::ResearchMode;
use council_agents::{display, AppConfig, OutputFormat, Pipeline};
use tracing::info;

/// Run a research → debate → vote council over one subject.
#[derive(Debug, Parser)]
#[command(name = "council-agents", version, about)]
struct Cli {
    /// Subject under analysis, e.g. a stock code.
    subject: String,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debate rounds before the vote.
    #[arg(long)]
    rounds: Option<u32>,

    /// Step ceiling for research runs.
    #[arg(long)]
    max_steps: Option<u32>,

    /// Delay between research launches, in milliseconds.
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Launch research runs concurrently, staggered by the pacing delay.
    #[arg(long)]
    staggered: bool,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write the report here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        let o = &mut config.orchestration;
        if let Some(rounds) = self.rounds {
            o.battle.debate_rounds = rounds;
        }
        if let Some(steps) = self.max_steps {
            o.actor.max_steps = steps;
        }
        if let Some(ms) = self.pacing_ms {
            o.research.pacing_ms = ms;
        }
        if self.staggered {
            o.research.mode = ResearchMode::Staggered;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    info!(
        subject = %cli.subject,
        llm = %config.llm.base_url,
        model = %config.llm.model,
        research = config.roster.research.len(),
        battle = config.roster.battle.len(),
        "Council starting"
    );

    let pipeline = Pipeline::from_config(&config)?;
    let report = pipeline
        .run(&cli.subject)
        .await
        .with_context(|| format!("council run for {} failed", cli.subject))?;
    let rendered = display::render(&report, cli.format).context("rendering report")?;

    match &cli.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
