// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error::Error, future, path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::{net::TcpListener, signal, sync::oneshot};

use modbus_sim::{
    config::AppConfig,
    http,
    inspect::Inspector,
    server::{tcp::Server, SimulatorService},
};

/// Simulates Modbus TCP slave devices with a REST API for inspection
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// JSON file with the slave topology
    #[clap(long, short, default_value = "slaves.json")]
    config: PathBuf,

    /// Overrides the Modbus TCP port of the configuration
    #[clap(long)]
    port: Option<u16>,

    /// Overrides the REST API port of the configuration
    #[clap(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let mut config = AppConfig::from_file(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(port) = args.http_port {
        config.http.port = port;
    }
    let registry = Arc::new(config.build_registry()?);
    log::info!(
        "Loaded {} slave(s) from {}",
        registry.slaves().len(),
        args.config.display()
    );

    let mut server = Server::bind(config.server.socket_addr()?)?;
    if let Some(max_connections) = config.server.max_connections {
        server = server.with_max_connections(max_connections);
    }
    let http_listener = TcpListener::bind(config.http.socket_addr()?).await?;

    let (http_shutdown_tx, http_shutdown_rx) = oneshot::channel::<()>();
    let http_task = tokio::spawn(http::serve(
        http_listener,
        Arc::new(Inspector::new(Arc::clone(&registry))),
        async move {
            http_shutdown_rx.await.ok();
        },
    ));

    let abort_signal = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {err}");
            future::pending::<()>().await;
        }
    };
    // Connection errors are logged by the server.
    let terminated = server
        .serve_until(SimulatorService::new(registry), drop, abort_signal)
        .await?;
    log::info!("Modbus server terminated: {terminated:?}");

    http_shutdown_tx.send(()).ok();
    http_task.await??;
    Ok(())
}
