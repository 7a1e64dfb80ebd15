use std::{future::IntoFuture, net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Request},
    routing::any,
    Router,
};
use clap::Parser;
use eyre::{Result, WrapErr};
use rudder::{
    adapters::{ConsulCatalog, ProxyHandler, UpstreamClient},
    config::{Args, RouterConfig},
    core::ResolverCache,
    utils::{GracefulShutdown, HealthState, ShutdownReason},
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    rudder::tracing_setup::init_tracing()?;

    let args = Args::parse();
    let config = RouterConfig::from_args(args)?;
    rudder::metrics::describe();

    let health = Arc::new(HealthState::new());

    // The health listener is optional and keeps serving the current status
    // for the whole process lifetime; during the drain it answers 503.
    if let Some(addr) = config.bind_health {
        let listener = TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("failed to bind health check address {addr}"))?;
        let state = health.clone();
        tokio::spawn(async move {
            let app = Router::new().fallback(move || {
                let state = state.clone();
                async move { state.status() }
            });
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "health check server failed");
            }
        });
        tracing::info!(address = %addr, "health check listening");
    }

    let catalog = Arc::new(ConsulCatalog::new(&config.consul, config.dial_timeout));
    let resolver = ResolverCache::new(catalog, config.cache_ttl);
    let transport = Arc::new(UpstreamClient::new(&config));
    let handler = Arc::new(ProxyHandler::new(resolver, transport, &config));

    let shutdown = Arc::new(GracefulShutdown::new());
    // Subscribe before the signal handler starts so no signal can be missed.
    let mut first_signal = shutdown.subscribe();
    let mut drain_signal = shutdown.subscribe();
    let mut force_signal = shutdown.subscribe();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = shutdown.run_signal_handler().await {
                tracing::error!(error = %err, "signal handler failed");
            }
        });
    }

    let listener = TcpListener::bind(config.bind_http)
        .await
        .wrap_err_with(|| format!("failed to bind http address {}", config.bind_http))?;
    tracing::info!(
        address = %config.bind_http,
        domain = %config.domain,
        consul = %config.consul,
        "router listening"
    );

    // Every path goes through the proxy; the router exposes no routes of its
    // own on the public listener.
    let make_proxy_route = |handler: Arc<ProxyHandler>| {
        any(
            move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>, req: Request| {
                let handler = handler.clone();
                async move { handler.handle(req, Some(client_addr)).await }
            },
        )
    };
    let app = Router::new()
        .route("/{*path}", make_proxy_route(handler.clone()))
        .route("/", make_proxy_route(handler));

    // Flip the health status before the accept loop stops so load balancers
    // start draining this instance first.
    let health_for_drain = health.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = drain_signal.recv().await;
        health_for_drain.set_draining();
        tracing::info!("health set to 503, stopping accept loop");
    });
    let mut server_task = tokio::spawn(server.into_future());

    tokio::select! {
        result = &mut server_task => {
            // The server ended on its own; without a signal that is a failure.
            result
                .wrap_err("http server task failed")?
                .wrap_err("failed to serve http requests")?;
            return Ok(());
        }
        _ = first_signal.recv() => {}
    }

    tracing::info!("shutting down, draining in-flight requests");
    let force = async move {
        loop {
            match force_signal.recv().await {
                Ok(ShutdownReason::Force) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    };

    tokio::select! {
        result = &mut server_task => {
            result
                .wrap_err("http server task failed")?
                .wrap_err("failed to serve http requests")?;
            tracing::info!("drained cleanly");
        }
        _ = tokio::time::sleep(config.shutdown_timeout) => {
            tracing::warn!(
                timeout = ?config.shutdown_timeout,
                "shutdown deadline exceeded, severing remaining connections"
            );
            server_task.abort();
        }
        _ = force => {
            tracing::warn!("second signal received, severing remaining connections");
            server_task.abort();
        }
    }

    Ok(())
}
