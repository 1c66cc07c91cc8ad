//! Thin batch driver: processes pending recordings against a Postgres
//! index. Owns no DSP logic of its own.

use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use castprint_core::config::Config;
use castprint_core::driver::Driver;
use castprint_core::index::PgIndex;

#[derive(Parser, Debug)]
#[command(name = "castprint-cli")]
#[command(about = "Process pending recordings against the fingerprint index")]
struct Args {
    /// Restrict to recordings from this source channel handle.
    #[arg(long)]
    channel: Option<String>,

    /// Only process recordings on or after this date (YYYY-MM-DD or MM/DD/YYYY).
    #[arg(long)]
    since: Option<String>,

    /// Only process recordings on or before this date (YYYY-MM-DD or MM/DD/YYYY).
    #[arg(long)]
    until: Option<String>,

    /// Batch size per `next_pending` call.
    #[arg(long, default_value_t = 100)]
    batch_size: usize,
}

fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if let Some(ref since) = args.since {
        parse_date(since)?;
    }
    if let Some(ref until) = args.until {
        parse_date(until)?;
    }

    let config = Config::load()?;
    let index = Arc::new(PgIndex::new(&config.database.url).await?);
    let driver = Arc::new(Driver::new(config, index));

    let cancel = CancellationToken::new();
    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling");
            ctrlc_cancel.cancel();
        }
    });

    info!(channel = ?args.channel, since = ?args.since, until = ?args.until, "starting batch run");

    let mut cursor: Option<Uuid> = None;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let next = driver
            .process_pending(
                args.batch_size,
                cursor,
                |recording| async move {
                    // Media acquisition is an external collaborator;
                    // this thin driver has no decode logic of its own.
                    Err(castprint_core::error::CoreError::Decode(format!(
                        "no loader configured for recording {}",
                        recording.id
                    )))
                },
                cancel.clone(),
            )
            .await;

        match next {
            Ok(Some(next_cursor)) => cursor = Some(next_cursor),
            Ok(None) => {
                info!("no more pending recordings");
                break;
            }
            Err(e) => {
                error!(error = %e, "batch failed");
                return Err(e.into());
            }
        }
    }

    Ok(())
}
