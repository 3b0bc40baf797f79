use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use gigmarket::application::engine::OrderEngine;
use gigmarket::application::sweeper::OverdueSweeper;
use gigmarket::config::Config;
use gigmarket::domain::ports::PaymentGatewayBox;
use gigmarket::infrastructure::gateway::StubPaymentGateway;
use gigmarket::infrastructure::in_memory::{InMemoryNotificationSink, InMemoryStore};
#[cfg(feature = "storage-rocksdb")]
use gigmarket::infrastructure::rocksdb::RocksDBStore;
use gigmarket::interfaces::csv::command_reader::CommandReader;
use gigmarket::interfaces::csv::report_writer::ReportWriter;
use gigmarket::interfaces::replay::Replay;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a CSV command script and print a report to stdout
    Replay {
        /// Input commands CSV file
        input: PathBuf,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Report::Orders)]
        report: Report,
    },
    /// Mark active orders past their deadline as overdue
    Sweep {
        /// Path to the persistent database to sweep
        #[arg(long)]
        db_path: PathBuf,

        /// Sweep a single time instead of on the configured interval
        #[arg(long)]
        once: bool,

        /// Day to sweep for (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    Orders,
    Sellers,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so reports on stdout stay machine readable.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal()),
        )
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gigmarket=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().into_diagnostic()?;

    match cli.command {
        Command::Replay {
            input,
            db_path,
            report,
        } => {
            let engine = Arc::new(build_engine(db_path, &config)?);
            let mut replay = Replay::new(engine, &config.sweeper);

            let file = File::open(input).into_diagnostic()?;
            let reader = CommandReader::new(file);
            for (index, record) in reader.commands().enumerate() {
                // Header is line 1.
                let line = index + 2;
                match record {
                    Ok(record) => {
                        let action = record.action;
                        if let Err(e) = replay.execute(record).await {
                            warn!(line, %action, error = %e, "Command rejected");
                        }
                    }
                    Err(e) => warn!(line, error = %e, "Unreadable command"),
                }
            }

            let stdout = io::stdout();
            let mut writer = ReportWriter::new(stdout.lock());
            match report {
                Report::Orders => {
                    let rows = replay.order_rows().await.into_diagnostic()?;
                    writer.write_orders(rows).into_diagnostic()?;
                }
                Report::Sellers => {
                    let rows = replay.seller_rows().await.into_diagnostic()?;
                    writer.write_sellers(rows).into_diagnostic()?;
                }
            }
        }
        Command::Sweep {
            db_path,
            once,
            date,
        } => {
            let engine = Arc::new(build_engine(Some(db_path), &config)?);
            let sweeper = OverdueSweeper::new(engine, config.sweeper.interval);
            if once {
                let today = date.unwrap_or_else(|| Utc::now().date_naive());
                sweeper.sweep_once(today).await.into_diagnostic()?;
            } else {
                sweeper
                    .run(async {
                        if let Err(e) = tokio::signal::ctrl_c().await {
                            warn!(error = %e, "Cannot listen for shutdown signal");
                        }
                    })
                    .await
                    .into_diagnostic()?;
                info!("Shut down cleanly");
            }
        }
    }

    Ok(())
}

fn build_engine(db_path: Option<PathBuf>, config: &Config) -> Result<OrderEngine> {
    let gateway: PaymentGatewayBox = Box::new(StubPaymentGateway::new());
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(OrderEngine::new(
                Box::new(store.clone()),
                Box::new(store),
                gateway,
                config.engine.clone(),
            ))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => Err(miette::miette!(
            "cannot open {}: persistent storage needs the storage-rocksdb feature",
            path.display()
        )),
        None => Ok(OrderEngine::new(
            Box::new(InMemoryStore::new()),
            Box::new(InMemoryNotificationSink::new()),
            gateway,
            config.engine.clone(),
        )),
    }
}
