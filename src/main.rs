//! BLE Notify Server - Main Entry Point

use std::sync::Arc;

use ble_notify_server::{
    PeripheralServer,
    backend::BluezStack,
    config::{CliArgs, Settings},
    transport::unix_socket::UnixSocketServer,
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ble_notify_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    info!(?args, "Starting BLE notify server");
    let settings = Settings::from(args);

    if settings.autostart.is_none() && !settings.enable_unix_socket {
        error!("Nothing to do: pass --service-uuid/--characteristic-uuid or --enable-unix-socket");
        return Err("No service configured and control socket disabled".into());
    }

    let stack = Arc::new(BluezStack::new(
        settings.adapter.clone(),
        settings.device_name.clone(),
    ));
    let server = Arc::new(PeripheralServer::new(stack));

    if let Some(autostart) = &settings.autostart {
        if let Err(e) = server
            .start(&autostart.service_uuid, &autostart.characteristic_uuid)
            .await
        {
            error!("Failed to start server: {}", e);
            if !settings.enable_unix_socket {
                return Err(e.into());
            }
        }
    }

    let socket_task = if settings.enable_unix_socket {
        info!("Starting Unix socket transport on {}", settings.socket_path);

        let socket_server = UnixSocketServer::new(
            settings.socket_path.clone(),
            settings.socket_mode,
            server.clone(),
        );
        let listener = socket_server.bind().await?;

        Some(tokio::spawn(async move {
            if let Err(e) = socket_server.serve(listener).await {
                error!("Unix socket server error: {}", e);
            }
        }))
    } else {
        None
    };

    #[cfg(feature = "systemd")]
    if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        warn!("Failed to notify systemd: {}", e);
    }

    info!("Service started successfully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        }
        _ = shutdown_signal() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
        _ = async {
            match socket_task {
                Some(task) => {
                    let _ = task.await;
                }
                None => std::future::pending::<()>().await,
            }
        } => {
            warn!("Unix socket server stopped");
        }
    }

    #[cfg(feature = "systemd")]
    if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Stopping]) {
        warn!("Failed to notify systemd: {}", e);
    }

    info!("Shutting down...");
    server.stop().await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");

    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await
}
