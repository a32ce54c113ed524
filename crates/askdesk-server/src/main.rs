//! AskDesk — website help desk chat backend.

use std::path::PathBuf;
use std::sync::Arc;

use askdesk_core::AskDeskConfig;
use askdesk_resolve::SearchOptions;
use askdesk_server::state::spawn_session_reaper;
use askdesk_server::{build_router, AppState};
use askdesk_store::DocType;
use askdesk_sync::SyncScope;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("ASKDESK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("AskDesk — help desk chat backend");
    println!();
    println!("Usage: askdesk [command]");
    println!();
    println!("Commands:");
    println!("  serve                    Start the server (default)");
    println!("  sync [type]              Sync the store with the content source");
    println!("  stats                    Print store statistics");
    println!("  search <query>           Print ranked hits with score breakdown");
    println!("  help                     Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("serve");

    if matches!(command, "--help" | "-h" | "help") {
        print_help();
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());
    let config = AskDeskConfig::from_env(&data_dir)?;
    let state = Arc::new(AppState::from_config(config)?);

    match command {
        "serve" => serve(state).await,
        "sync" => {
            let scope = match args.get(2) {
                Some(t) => SyncScope::Type(t.parse::<DocType>()?),
                None => SyncScope::All,
            };
            let report = state.synchronizer.sync(scope).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_partial_failure() {
                std::process::exit(2);
            }
            Ok(())
        }
        "stats" => {
            let stats = state.store.get_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        "search" => {
            let query = args[2..].join(" ");
            if query.trim().is_empty() {
                eprintln!("Usage: askdesk search <query>");
                std::process::exit(1);
            }
            let opts = SearchOptions::from(state.config.search);
            let hits = state.search.search(&query, &opts).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{:>2}. [{}] {} ({}) combined={:.4} vector={:.4} text={:.4}",
                    i + 1,
                    hit.doc_type,
                    hit.title,
                    hit.id,
                    hit.combined_score,
                    hit.vector_score,
                    hit.text_score
                );
            }
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}. Use 'askdesk help' for usage.", other);
            std::process::exit(1);
        }
    }
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    spawn_session_reaper(state.clone());

    let app = build_router(state.clone());
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("AskDesk server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
