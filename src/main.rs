#![cfg(not(tarpaulin_include))]

use std::sync::Arc;

use almacen::app::{self, AppState};
use almacen::config::Config;
use almacen::connector;
use log::warn;

/// Main entry point for the inventory form
///
/// Loads `.env`, reads the configuration, connects to the spreadsheet service and
/// serves the configured edition until the process is stopped.
///
/// The connection is made before the async runtime starts, since the blocking HTTP
/// client may not be created or dropped on a runtime thread. A failed connection does
/// not stop the server: the form then runs in degraded mode with empty data.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let connection = connector::establish(&config);
    if let Some(problem) = &connection.problem {
        warn!("running without the spreadsheet: {problem}");
    }

    let state = Arc::new(AppState::new(config, connection));
    let runtime = tokio::runtime::Runtime::new()?;
    let served = runtime.block_on(app::serve(state.clone()));

    // blocking pool threads may still hold clones; wait for them before the last drop
    drop(runtime);
    drop(state);
    served
}
