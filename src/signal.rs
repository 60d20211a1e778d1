//! Signal handling for run cancellation.

use tracing::{info, warn};

/// Wait for a shutdown signal (SIGINT, SIGTERM, or SIGQUIT on Unix).
///
/// If the Unix handlers cannot be installed, falls back to Ctrl-C only.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let handlers = (|| {
        Ok::<_, std::io::Error>((
            signal(SignalKind::interrupt())?,
            signal(SignalKind::terminate())?,
            signal(SignalKind::quit())?,
        ))
    })();

    let (mut sigint, mut sigterm, mut sigquit) = match handlers {
        Ok(handlers) => handlers,
        Err(e) => {
            warn!(error = %e, "Failed to install signal handlers; only Ctrl-C will cancel the run");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {
            info!(message = "Signal received.", signal = "SIGINT");
        }
        _ = sigterm.recv() => {
            info!(message = "Signal received.", signal = "SIGTERM");
        }
        _ = sigquit.recv() => {
            info!(message = "Signal received.", signal = "SIGQUIT");
        }
    }
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(message = "Signal received.", signal = "Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::signal::unix::{SignalKind, signal};

    /// Raise `signum` until `shutdown_signal` returns.
    async fn assert_resolves_on(kind: SignalKind, signum: libc::c_int) {
        // Registered first so the signal never takes its default action.
        let _handled = signal(kind).unwrap();
        let waiter = tokio::spawn(shutdown_signal());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !waiter.is_finished() {
                // SAFETY: the signal is handled by this process.
                unsafe { libc::raise(signum) };
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("shutdown_signal should return after the signal");

        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_sigterm_resolves_shutdown() {
        assert_resolves_on(SignalKind::terminate(), libc::SIGTERM).await;
    }

    #[tokio::test]
    async fn test_sigint_resolves_shutdown() {
        assert_resolves_on(SignalKind::interrupt(), libc::SIGINT).await;
    }
}
