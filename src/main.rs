use astra::Server;
use clap::Parser;
use map_search::config::{Cli, Command, ServeArgs};
use map_search::db::{backfill_spatial_keys, init_db, insert_properties, Database, SqlitePointStore};
use map_search::domain::NewProperty;
use map_search::responses::error_to_response;
use map_search::router::{handle, AppState};
use map_search::search::SearchService;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // 1. Create the database handle and make sure the schema exists
    let db = Database::new(cli.db.clone());
    if let Err(e) = init_db(&db) {
        error!(error = %e, "database initialization failed");
        std::process::exit(1);
    }

    // 2. Run the requested command
    let outcome = match &cli.command {
        Command::Serve(args) => serve(db, args),
        Command::Import { file } => import(&db, file),
        Command::Backfill => backfill(&db),
    };

    if let Err(e) = outcome {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

fn serve(db: Database, args: &ServeArgs) -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let state = AppState {
        search: Arc::new(SearchService::new(
            SqlitePointStore::new(db),
            args.search_config(),
        )),
        runtime: runtime.handle().clone(),
    };

    info!(addr = %args.addr, workers = args.workers, "starting server");
    let server = Server::bind(&args.addr).max_workers(args.workers);

    server.serve(move |req, _info| match handle(req, &state) {
        Ok(resp) => resp,
        Err(err) => error_to_response(err),
    })?;

    info!("server shut down cleanly");
    Ok(())
}

fn import(db: &Database, file: &Path) -> Result<(), Box<dyn Error>> {
    let raw = std::fs::read_to_string(file)?;
    let properties: Vec<NewProperty> = serde_json::from_str(&raw)?;

    let inserted = insert_properties(db, &properties)?;
    info!(inserted, file = %file.display(), "import complete");
    Ok(())
}

fn backfill(db: &Database) -> Result<(), Box<dyn Error>> {
    let updated = backfill_spatial_keys(db)?;
    info!(updated, "spatial key backfill complete");
    Ok(())
}
