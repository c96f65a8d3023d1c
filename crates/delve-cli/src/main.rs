//! `delve` - repair model output, print schema examples, replay pipeline fixtures

mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use delve_generation::StructuredOutput;
use delve_pipeline::{AnalysisResult, DataPlan, GapAnalysis, PipelineConfig, ResearchPlan, Synthesis};
use delve_schema::Shape;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Resilient structured generation and research pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair raw model text into a schema-valid object
    Repair {
        /// Target schema
        #[arg(short, long, value_enum)]
        schema: SchemaName,
        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Print the example payload for a schema
    Example {
        /// Target schema
        #[arg(short, long, value_enum)]
        schema: SchemaName,
    },

    /// Run a pipeline against a scripted YAML fixture
    Replay {
        /// Fixture file
        #[arg(short, long)]
        fixture: PathBuf,
        /// Pipeline config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Built-in schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SchemaName {
    Analysis,
    Plan,
    Gap,
    Synthesis,
    DataPlan,
}

impl SchemaName {
    fn shape(self) -> Shape {
        match self {
            Self::Analysis => AnalysisResult::shape(),
            Self::Plan => ResearchPlan::shape(),
            Self::Gap => GapAnalysis::shape(),
            Self::Synthesis => Synthesis::shape(),
            Self::DataPlan => DataPlan::shape(),
        }
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).context("reading stdin")?;
            Ok(text)
        }
    }
}

fn run_repair(schema: SchemaName, input: Option<&Path>) -> Result<()> {
    let raw = read_input(input)?;
    let shape = schema.shape();
    match delve_repair::salvage(&raw, &shape) {
        Some(salvaged) => {
            tracing::info!(step = ?salvaged.step, stage = ?salvaged.stage, "input salvaged");
            println!("{}", serde_json::to_string_pretty(&salvaged.value)?);
            eprintln!("step: {:?}, repair stage: {:?}", salvaged.step, salvaged.stage);
        }
        None => {
            tracing::warn!("nothing salvageable, printing the minimal object");
            println!("{}", serde_json::to_string_pretty(&delve_repair::minimal_valid_object(&shape))?);
            eprintln!("step: minimal");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Repair { schema, input } => run_repair(schema, input.as_deref()),
        Commands::Example { schema } => {
            println!("{}", delve_repair::example_payload(&schema.shape()));
            Ok(())
        }
        Commands::Replay { fixture, config } => {
            let config = match config {
                Some(path) => PipelineConfig::load(&path)?,
                None => PipelineConfig::default(),
            };
            replay::run(&fixture, config).await
        }
    }
}
