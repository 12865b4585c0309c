use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use herdbook_core::{db, maintenance, store::PostgresStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Herdbook administrative tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan (and optionally apply) removal of every cow, sensor and measurement
    Wipe(WipeArgs),
}

#[derive(Args, Debug, Default)]
struct WipeArgs {
    /// Delete the records instead of only printing the plan
    #[arg(long)]
    apply: bool,
    /// Skip running migrations before inspecting the database
    #[arg(long)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Wipe(args) => handle_wipe(args).await,
    }
}

async fn handle_wipe(args: WipeArgs) -> Result<()> {
    dotenvy::dotenv().ok();

    let database_url = db::database_url_from_env()?;
    let pool = db::connect(&database_url, 2).await?;

    if args.skip_migrations {
        info!("Skipping migrations at user request");
    } else {
        db::run_migrations(&pool).await?;
    }

    let store = PostgresStore::new(pool);
    let plan = maintenance::plan_wipe(&store).await?;

    if plan.is_empty() {
        println!("Nothing to wipe. The database holds no cows, sensors or measurements.");
        return Ok(());
    }

    println!("Wipe would remove:");
    println!("  measurements: {}", plan.counts.measurements);
    println!("  sensors:      {}", plan.counts.sensors);
    println!("  cows:         {}", plan.counts.cows);

    if args.apply {
        let removed = maintenance::apply_wipe(&store, &plan).await?;
        println!("Removed {} records.", removed.total());
    } else {
        println!("Run again with --apply to delete them.");
    }

    Ok(())
}
