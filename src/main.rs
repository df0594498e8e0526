use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

use cricket_ingest::{IngestConfig, RunHalted, run_ingest, schema, store};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cricket_ingest=info")),
        )
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = IngestConfig::from_env().apply_args(&args);

    let mut conn = schema::open_db(&config.db_path, config.busy_timeout)
        .with_context(|| format!("open sqlite db {}", config.db_path.display()))?;

    let summary = match run_ingest(&mut conn, &config) {
        Ok(summary) => summary,
        Err(RunHalted { summary, error }) => {
            error!(
                matches_loaded = summary.matches_loaded,
                skipped_items = summary.skipped_items,
                broken_matches = summary.broken_matches,
                "ingest halted"
            );
            return Err(error).context("ingest halted");
        }
    };

    let counts = store::table_counts(&conn).context("count stored rows")?;

    println!("Match ingest complete");
    println!("DB: {}", config.db_path.display());
    println!("Data: {}", summary.data_dir.display());
    println!("Files seen: {}", summary.files_seen);
    println!("Matches loaded: {}", summary.matches_loaded);
    println!("Already stored: {}", summary.duplicates_skipped);
    println!("Skipped items: {}", summary.skipped_items);
    println!("Broken matches: {}", summary.broken_matches);
    println!(
        "Rows: teams={} players={} events={} wickets={} balls={}",
        counts.teams, counts.players, counts.events, counts.wickets, counts.balls
    );

    Ok(())
}
