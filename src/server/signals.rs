//! Signal handling utilities for the gpumemfs daemon
//!
//! SIGINT and SIGTERM flip a process-wide flag; the daemon main loop
//! polls it and tears the mount down cleanly so every allocation is
//! released before exit.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Register handlers for SIGINT (Ctrl+C) and SIGTERM.
pub fn setup_signal_handlers() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
    }
}

/// Whether a shutdown signal has been received.
pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

#[cfg(unix)]
extern "C" fn signal_handler(_: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}
