use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use console::Term;

/// Global shutdown flag, shared with the harvester as its cancel flag.
static SHUTDOWN_REQUESTED: LazyLock<Arc<AtomicBool>> =
    LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Handle to the shutdown flag for library cancellation.
pub(crate) fn shutdown_flag() -> Arc<AtomicBool> {
    Arc::clone(&SHUTDOWN_REQUESTED)
}

#[inline]
fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::Release);
}

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C raises the flag so harvests stop before their next
/// request and the resolver flushes its checkpoint. The second one exits.
pub(crate) fn setup_shutdown_handler() {
    tokio::spawn(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing current request...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing current request");
        }

        request_shutdown();

        if tokio::signal::ctrl_c().await.is_ok() {
            if is_tty {
                eprintln!("Force quit!");
            }
            std::process::exit(130);
        }
    });
}
