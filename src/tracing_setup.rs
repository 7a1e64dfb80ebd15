//! Logging initialization and span helpers.
//!
//! Interactive runs get pretty console output; everything else (the normal
//! deployment) gets JSON lines on stderr for log shipping. The switch keys
//! off whether stderr is a terminal, so `rudder 2>file` behaves like
//! production.
use std::io::IsTerminal;

use eyre::{Result, WrapErr};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize structured logging. JSON when stderr is redirected, pretty
/// output when attached to a terminal. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::io::stderr().is_terminal() {
        Registry::default()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
            .wrap_err("failed to initialize console logging")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init()
            .wrap_err("failed to initialize json logging")?;
    }

    Ok(())
}

/// Create a request-scoped tracing span.
pub fn create_request_span(
    method: &str,
    path: &str,
    request_id: &str,
    client_ip: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        client.ip = client_ip,
        service = tracing::field::Empty,
        backend = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}
