//! CrateDB Sink CLI
//!
//! Command-line interface for the CrateDB metric sink:
//! - Render INSERT statements for a batch without executing them
//! - Write JSON-lines metric batches into CrateDB
//! - Create the destination table
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use cratedb_sink::{
    generate_default_config, Config, CrateSink, HttpExecutor, LoggingConfig, MetricRecord,
    StatementBuilder,
};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cratedb-sink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Write time-series metric batches into CrateDB")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the INSERT statement for a batch without executing it
    Render {
        /// JSON-lines input file, or "-" for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Write a batch of JSON-lines records into CrateDB
    Write {
        /// JSON-lines input file, or "-" for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Print the CREATE TABLE statement, or run it with --execute
    CreateTable {
        /// Execute against the configured CrateDB instead of printing
        #[arg(long)]
        execute: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("failed to write {:?}", path))?;
                println!("Wrote default config to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    // Loading runs before the configured subscriber exists; surface its
    // warnings on stderr
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("failed to load config from {:?}", path)),
        None => Config::load_default().context("failed to load default config"),
    })?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging);

    tracing::info!("CrateDB sink v{}", env!("CARGO_PKG_VERSION"));
    config.sink.validate()?;

    match cli.command {
        Commands::Render { input } => {
            let records = read_records(&input)?;
            let builder = StatementBuilder::new(config.sink.encoder()?);
            let sql = builder.build_insert(&config.sink.table, &records)?;
            println!("{}", sql);
        }

        Commands::Write { input } => {
            let records = read_records(&input)?;
            tracing::info!("Read {} records from {:?}", records.len(), input);

            let executor = Arc::new(HttpExecutor::from_config(&config.sink)?);
            let sink = CrateSink::connect(config.sink, executor).await?;
            let written = sink.write_all(&records).await?;

            tracing::info!("Wrote {} records ({})", written, sink.stats());
            sink.close();
        }

        Commands::CreateTable { execute } => {
            let builder = StatementBuilder::new(config.sink.encoder()?);
            if execute {
                let executor = Arc::new(HttpExecutor::from_config(&config.sink)?);
                let mut sink_config = config.sink;
                sink_config.table_create = true;
                CrateSink::connect(sink_config, executor).await?.close();
            } else {
                println!(
                    "{}",
                    builder.build_create_table(&config.sink.table, config.sink.partition_by_day)
                );
            }
        }

        Commands::Config { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Initialize tracing from logging config; `RUST_LOG` wins when set
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("cratedb_sink={}", logging.level))
    });

    // Logs go to stderr so rendered SQL on stdout stays clean
    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn read_records(path: &Path) -> anyhow::Result<Vec<MetricRecord>> {
    let records = if path == Path::new("-") {
        MetricRecord::from_json_lines(std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(path).with_context(|| format!("failed to open {:?}", path))?;
        MetricRecord::from_json_lines(BufReader::new(file))?
    };
    Ok(records)
}
