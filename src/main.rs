//! Portcullis Console - Demo Entry Point
//!
//! Wires a store, an HTTP backend and an action bus together, performs one
//! full synchronization pass against the management API and logs the result.

use portcullis_console::config::ConsoleConfig;
use portcullis_console::error::Result;
use portcullis_console::eventing::{Intent, Notice};
use portcullis_console::services::{ActionBus, HttpBackend};
use portcullis_console::state::SharedStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "console.toml".to_string());
    let config = ConsoleConfig::load(&config_path)?;
    tracing::info!("syncing against {}", config.base_url);

    let backend = HttpBackend::new(&config.base_url, config.timeout())?;
    let (bus, intents) = ActionBus::new(SharedStore::new(), backend);
    let mut notices = bus.subscribe();
    let handle = bus.clone();
    tokio::spawn(bus.run(intents));

    handle.emit(Intent::LoadServices)?;
    while let Ok(notice) = notices.recv().await {
        match notice {
            Notice::LoadedServices => {
                for service in handle.store().services() {
                    tracing::info!(
                        name = %service.name,
                        handler = %service.handler,
                        running = service.running,
                        "service"
                    );
                }
                break;
            }
            Notice::OperationFailed { intent, message } => {
                tracing::error!("{intent} failed: {message}");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
