// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use address_controller::{
    config::ControllerOptions,
    instance::InstanceManager,
    metrics,
    platform::{kubernetes::KubePlatform, Platform},
    reconcilers::{retry_with_backoff, DestinationReconciler, InstanceReconciler, WatchLoop},
    selector,
    templates::TemplateCatalog,
};
use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::Parser;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("address-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_tracing();

    let options = ControllerOptions::parse();
    info!("Starting address controller");
    debug!(?options, "Parsed controller options");

    let namespace = options.resolve_namespace()?;

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    let platform: Arc<dyn Platform> = Arc::new(KubePlatform::new(client));
    debug!("Kubernetes client initialized successfully");

    let catalog = TemplateCatalog::load_dir(&options.template_dir)?;
    let manager = InstanceManager::new(Arc::clone(&platform), Arc::new(catalog), namespace)
        .with_instance_template(options.instance_template.clone());
    let permits = Arc::new(Semaphore::new(options.worker_pool_size));

    let (stop, shutdown) = watch::channel(false);
    let server = tokio::spawn(serve_metrics(options.metrics_addr, shutdown.clone()));
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested, stopping watch loops");
        stop.send_replace(true);
    });

    if options.multiinstance {
        run_multi_instance(manager, permits, shutdown).await;
    } else {
        run_single_instance(&options, manager, permits, shutdown).await?;
    }

    match server.await {
        Ok(result) => result?,
        Err(e) => error!(error = %e, "Metrics server task failed"),
    }
    info!("Address controller stopped");
    Ok(())
}

/// Install the tracing subscriber.
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`json` or text).
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

/// Watch instance records cluster-wide; every instance gets its own
/// destination loop.
async fn run_multi_instance(
    manager: InstanceManager,
    permits: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
) {
    info!(namespace = %manager.namespace(), "Running in multi-instance mode");

    let reconciler = Arc::new(InstanceReconciler::new(manager.clone(), Arc::clone(&permits)));
    WatchLoop::new(
        Arc::clone(manager.platform()),
        manager.namespace(),
        selector::instance_records(),
        reconciler.clone(),
        permits,
    )
    .run(shutdown)
    .await;

    reconciler.shutdown().await;
}

/// Manage the controller namespace as the only instance.
async fn run_single_instance(
    options: &ControllerOptions,
    manager: InstanceManager,
    permits: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let instance = options.single_instance(manager.namespace())?;
    info!(instance = %instance.id, "Running in single-instance mode");

    retry_with_backoff(|| manager.create_instance(&instance), "create instance")
        .await
        .context("failed to create the controller's own instance")?;

    let reconciler = DestinationReconciler::new(
        Arc::clone(manager.platform()),
        Arc::clone(manager.renderer()),
        instance.id.clone(),
    );
    WatchLoop::new(
        Arc::clone(manager.platform()),
        instance.id.namespace(),
        selector::address_configs(),
        Arc::new(reconciler),
        permits,
    )
    .run(shutdown)
    .await;
    Ok(())
}

/// Serve `/metrics` and `/healthz` until shutdown.
async fn serve_metrics(addr: SocketAddr, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics endpoint on {addr}"))?;
    info!(addr = %addr, "Serving metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
