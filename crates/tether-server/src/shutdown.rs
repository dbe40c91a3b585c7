//! Server lifecycle: the serve/interrupt race
//!
//! Two producers race to terminate the process: the HTTP listener (which
//! only yields when the transport fails) and the OS interrupt signal. Both
//! report into one channel; the first event wins and its cause is returned
//! to the caller. A signal arriving while a serve error is in flight may
//! legitimately lose the race.

use std::fmt;
use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::debug;

/// Why the server stopped
#[derive(Debug)]
pub enum ShutdownEvent {
    /// An OS interrupt arrived; carries the signal name
    Interrupt(String),
    /// The listener failed
    ServeError(std::io::Error),
}

impl fmt::Display for ShutdownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownEvent::Interrupt(signal) => write!(f, "received signal {signal}"),
            ShutdownEvent::ServeError(e) => write!(f, "server failed: {e}"),
        }
    }
}

/// Resolve when the process receives an interrupt; yields the signal name
pub async fn interrupt_signal() -> String {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::interrupt()) {
            Ok(mut sigint) => {
                sigint.recv().await;
                "SIGINT".to_string()
            }
            Err(e) => {
                // With no handler the only interrupt path is default OS
                // termination; park forever rather than spin.
                debug!(error = %e, "failed to register SIGINT handler");
                std::future::pending().await
            }
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c".to_string(),
            Err(e) => {
                debug!(error = %e, "failed to register ctrl-c handler");
                std::future::pending().await
            }
        }
    }
}

/// Serve `router` on `listener` until either the transport fails or the
/// given interrupt future resolves. Returns the first terminating event.
///
/// The interrupt is injected rather than hard-wired so tests can trigger
/// shutdown deterministically; production passes [`interrupt_signal`].
pub async fn serve_until(
    listener: TcpListener,
    router: Router,
    interrupt: impl Future<Output = String> + Send + 'static,
) -> ShutdownEvent {
    let (tx, mut rx) = mpsc::channel::<ShutdownEvent>(2);

    let serve_tx = tx.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            let _ = serve_tx.send(ShutdownEvent::ServeError(e)).await;
        }
    });

    let signal_task = tokio::spawn(async move {
        let name = interrupt.await;
        let _ = tx.send(ShutdownEvent::Interrupt(name)).await;
    });

    // Both producers hold a sender, so recv() yields the first event. The
    // channel can never close before that.
    let event = match rx.recv().await {
        Some(event) => event,
        None => ShutdownEvent::Interrupt("channel closed".to_string()),
    };

    server.abort();
    signal_task.abort();
    event
}
