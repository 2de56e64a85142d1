use std::process::ExitCode;
use std::sync::Arc;

use wasm_server::config::{self, AppState, Config};
use wasm_server::server::signal;
use wasm_server::{logger, Server, ServerError};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            logger::log_error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), ServerError> {
    let cfg = Config::load_from(config::CONFIG_FILE)?;
    logger::init(&cfg).map_err(ServerError::Log)?;

    // Build the Tokio runtime, sizing worker threads from config
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }

    let runtime = runtime_builder.build().map_err(|source| ServerError::Io {
        context: "failed to start runtime",
        source,
    })?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), ServerError> {
    // Files are always served from wherever the server was started
    let root = std::env::current_dir().map_err(|source| ServerError::Io {
        context: "failed to read working directory",
        source,
    })?;
    let state = Arc::new(AppState::new(cfg, &root)?);

    let server = Server::start(config::listen_addr(), Arc::clone(&state))?;
    logger::log_server_start(&server.local_addr(), &state);

    let waited = signal::wait_for_shutdown().await;
    if let Ok(name) = waited {
        logger::log_shutdown(name);
    }

    // Release the socket even if signal registration failed
    server.stop().await;
    waited.map(|_| ())
}
