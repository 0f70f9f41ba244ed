use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use pixel_explorer::config::{Cli, Command, ReindexArgs, ServeArgs};
use pixel_explorer::data::loader::{load_catalog, save_catalog};
use pixel_explorer::data::store::{CatalogStore, FsPixelSource};
use pixel_explorer::reindex::reindex;
use pixel_explorer::state::MemorySessionStore;
use pixel_explorer::web::{router, AppState};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args),
        Command::Reindex(args) => run_reindex(args),
    }
}

fn serve(args: ServeArgs) -> Result<()> {
    let data_dir = args.data_dir();
    let catalog = load_catalog(&args.catalog)?;
    let store = CatalogStore::open(catalog, &data_dir)
        .with_context(|| format!("Cannot open catalog {}", args.catalog.display()))?;
    log::info!(
        "serving {} Pixel Sets, pixel files under {}",
        store.len(),
        data_dir.display()
    );

    let sessions = Arc::new(MemorySessionStore::new(args.session_ttl()));
    let state = AppState::new(store, sessions)
        .with_page_size(args.page_size)
        .with_preview_limit(args.preview_limit);
    let app = router(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot start the async runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(args.bind)
            .await
            .with_context(|| format!("Cannot bind {}", args.bind))?;
        log::info!("listening on http://{}", args.bind);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}

fn run_reindex(args: ReindexArgs) -> Result<()> {
    let data_dir = args.data_dir();
    let mut catalog = load_catalog(&args.catalog)?;
    let summary = reindex(&mut catalog, &FsPixelSource::new(&data_dir))
        .with_context(|| format!("Reindex of {} failed", args.catalog.display()))?;
    save_catalog(&args.catalog, &catalog)?;
    log::info!(
        "wrote {} ({} Pixel Sets)",
        args.catalog.display(),
        summary.pixel_sets
    );
    Ok(())
}
