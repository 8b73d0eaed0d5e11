//! SIGINT/SIGTERM handling for a running session.
//!
//! A signal raises the stop flag the acquisition loop checks once per tick.
//! The loop then returns normally, so the record file is flushed and the
//! device and process timing guards are released on the usual path.

use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Written by the signal handler, drained by the watcher thread.
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_stop_signal(signum: c_int) {
    PENDING_SIGNAL.store(signum, Ordering::Relaxed);
}

/// Stop flag shared between signal delivery and the acquisition loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignals {
    stop: Arc<AtomicBool>,
    received: Arc<AtomicU32>,
}

impl StopSignals {
    /// Install handlers for SIGINT and SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher thread or a handler cannot be set up.
    pub fn install() -> std::io::Result<Self> {
        let signals = Self::default();
        #[cfg(unix)]
        signals.register()?;
        Ok(signals)
    }

    /// The handler only stores to an atomic; the watcher thread turns a
    /// pending signal into a stop request and logs it.
    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn register(&self) -> std::io::Result<()> {
        use nix::sys::signal::{signal, SigHandler, Signal};

        let watcher = self.clone();
        std::thread::Builder::new()
            .name("stop-signals".into())
            .spawn(move || {
                while !watcher.stop_requested() {
                    let signum = PENDING_SIGNAL.swap(0, Ordering::Relaxed);
                    if signum != 0 {
                        let name = Signal::try_from(signum).map_or("unknown", Signal::as_str);
                        watcher.received.fetch_add(1, Ordering::Relaxed);
                        info!(signal = name, "Stop signal received, ending session");
                        watcher.request_stop();
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            })?;

        // SAFETY: on_stop_signal is async-signal-safe; it performs one atomic store.
        unsafe {
            signal(Signal::SIGINT, SigHandler::Handler(on_stop_signal))?;
            signal(Signal::SIGTERM, SigHandler::Handler(on_stop_signal))?;
        }
        debug!("SIGINT/SIGTERM handlers installed");
        Ok(())
    }

    /// Flag handed to the acquisition loop.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Whether a stop was requested by signal or by hand.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Request a stop without a signal.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Number of stop signals delivered.
    pub fn received(&self) -> u32 {
        self.received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_signals_not_stopped() {
        let signals = StopSignals::default();
        assert!(!signals.stop_requested());
        assert_eq!(signals.received(), 0);
    }

    #[test]
    fn test_request_stop_raises_shared_flag() {
        let signals = StopSignals::default();
        let flag = signals.stop_flag();
        assert!(!flag.load(Ordering::Relaxed));

        signals.request_stop();
        assert!(flag.load(Ordering::Relaxed));
        assert!(signals.clone().stop_requested());
    }
}
