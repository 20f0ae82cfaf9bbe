use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing_subscriber::EnvFilter;

use outliner::config::AppConfig;
use outliner::keys::KeybindingMap;
use outliner::sync::daily_title;
use outliner::{GraphStore, HttpStore, MemoryStore, PageSession, SessionOptions, SyncStatus};

fn config_path() -> PathBuf {
    AppConfig::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("outliner=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let path = config_path();

    if !path.exists() {
        AppConfig::write_default(&path)?;
        eprintln!(
            "Created default config at: {}\nEdit it to point at your graph store, then run again.",
            path.display()
        );
        return Ok(());
    }

    let config = match AppConfig::load_from_path(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            eprintln!("Fix the config file or delete it to regenerate defaults.");
            return Ok(());
        }
    };

    let keymap = KeybindingMap::from_preset(&config.keybindings.preset, &config.keybindings.bindings)?;
    let store: Arc<dyn GraphStore> = if config.store.is_memory() {
        tracing::info!("using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(HttpStore::new(&config.store.url, &config.store.token))
    };

    let title = std::env::args()
        .nth(1)
        .unwrap_or_else(|| daily_title(Local::now().date_naive()));
    let session = PageSession::open_by_title(store, &title, SessionOptions::from(&config.sync)).await?;

    println!("{}", session.title().unwrap_or(&title));
    for block in session.views() {
        let marker = if block.is_active { '>' } else { '-' };
        println!("{}{} {}", "  ".repeat(block.depth), marker, block.value);
    }

    let backlinks = session.references().await?;
    if !backlinks.is_empty() {
        println!("\nLinked references");
        for group in backlinks.values() {
            println!("  {}", group.page_title);
            for reference in &group.references {
                println!("    - {}", reference.value);
            }
        }
    }

    let hints: Vec<String> = keymap
        .hints()
        .into_iter()
        .map(|(key, label)| format!("{} {}", key, label))
        .collect();
    println!("\n{}", hints.join(" · "));

    if let SyncStatus::Failed(issue) = session.close().await? {
        eprintln!("{}: {}\n{}", issue.title, issue.message, issue.hint);
    }
    Ok(())
}
