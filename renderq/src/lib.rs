/*
Developer blog:
- The queue started out as the desktop app's store. Moving it here means the render loop no longer
    depends on a window being open, and the command line can drive the exact same code.
- Only one render process is ever alive. The session owns it and the queue just reacts to what the
    session reports, which keeps pause and stop simple: kill the process, count what was reported.
- Settings and the queue file live in the config dir unless RENDERQ_CONFIG_DIR says otherwise.

[F] - watch the scene file and offer to re-render changed frames
*/
use clap::Parser;
use dotenv::dotenv;
use domains::settings_store::SettingsStore;
use services::{
    cli_app::{CliApp, Commands},
    data_store::{json_settings_store::JsonSettingsStore, memory_store::MemorySettingsStore},
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub mod domains;
pub mod models;
pub mod services;

#[derive(Parser)]
#[command(name = "renderq", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();

    let settings: Arc<dyn SettingsStore> = match JsonSettingsStore::at_default_location() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("settings will not be saved: {e}");
            Arc::new(MemorySettingsStore::default())
        }
    };
    CliApp::new(settings).run(cli.command).await
}
