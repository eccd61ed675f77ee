pub mod color;
pub mod commands;
pub mod console;
pub mod error;
pub mod message_log;
pub mod notify;
pub mod outbound;
pub mod pipeline;
pub mod rules;
pub mod serial;
pub mod settings;
pub mod store;
mod utils;

use anyhow::{Context, Result};
use std::{io::Write, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};

use commands::AppState;
use console::Console;
use message_log::MessageLog;
use notify::PrintNotifier;
use serial::HardwarePortProvider;
use settings::SettingsStore;
use store::KvStore;

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Chroma Bridge starting up...");

    let data_dir = settings::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let mut initial = settings_store.settings();
    initial.apply_overrides(|key| std::env::var(key).ok());

    let store = Arc::new(KvStore::open(data_dir.join("store.json"))?);
    let message_log = MessageLog::load(store);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let receive_port = Arc::new(HardwarePortProvider::new(initial.receive_port.clone()));
        let send_port = Arc::new(HardwarePortProvider::new(initial.send_port.clone()));

        let console = Console::new(
            receive_port.clone(),
            send_port.clone(),
            initial.mode,
            message_log,
            Arc::new(PrintNotifier),
        );

        let state = AppState {
            console,
            settings: settings_store,
            receive_port,
            send_port,
        };

        shell(&state).await
    })
}

async fn shell(state: &AppState) -> Result<()> {
    println!("Chroma Bridge console (mode: {}). Type help for commands.", state.console.mode());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read command")? else {
            break;
        };
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }

        match commands::dispatch(line, state).await {
            Ok(reply) if reply.is_empty() => {}
            Ok(reply) => println!("{reply}"),
            Err(err) => eprintln!("error: {err}"),
        }
    }

    state.console.shutdown().await;
    log::info!("Chroma Bridge shut down");
    Ok(())
}
