use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use softscope::client::extend_with_soft_delete;
use softscope::error::{Result, SoftscopeError};
use softscope::persist::Persistor;
use softscope::seed::reset_and_seed_scenario_data;
use softscope::server;
use softscope::settings::Settings;

// ------------- STARTUP --------------
// softscope            serve the HTTP surface (default)
// softscope seed       reset the database to the scenario data and exit

#[tokio::main]
async fn main() {
    let settings = match Settings::load("softscope") {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());
    if let Err(e) = run(&command, settings).await {
        error!(error=%e, "softscope stopped");
        std::process::exit(1);
    }
}

async fn run(command: &str, settings: Settings) -> Result<()> {
    let schema = settings.schema()?;
    let persistor = Persistor::new(settings.persistence_mode(), &schema)?;
    let client = extend_with_soft_delete(persistor, &schema);
    info!(hooks=?client.hook_names(), "client ready");

    match command {
        "seed" => {
            reset_and_seed_scenario_data(&client)?;
            Ok(())
        }
        "serve" => {
            if settings.seed {
                reset_and_seed_scenario_data(&client)?;
            }
            let app = server::router(Arc::new(client));
            let listener = tokio::net::TcpListener::bind(&settings.listen)
                .await
                .map_err(|e| SoftscopeError::Config(format!("Could not bind {}: {e}", settings.listen)))?;
            info!(listen=%settings.listen, "serving");
            axum::serve(listener, app)
                .await
                .map_err(|e| SoftscopeError::Execution(format!("Server failed: {e}")))
        }
        other => Err(SoftscopeError::Config(format!("Unknown command '{other}', expected 'serve' or 'seed'"))),
    }
}
