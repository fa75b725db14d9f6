use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Nominal cadence of the background timekeeper.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Work driven by the timekeeper's clock.
pub trait Tickable: Send + Sync {
    fn tick(&self, now: Instant);
}

/// A single background thread ticking a shared target at a fixed interval.
///
/// Ticks never overlap; a tick that runs long simply delays the next one,
/// which is harmless since every expiry decision compares wall-clock ages.
/// The thread is signalled and joined when the timekeeper drops.
pub struct Timekeeper {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Timekeeper {
    /// Spawns the timekeeper thread. `interval` is `TICK_INTERVAL` in
    /// production; tests shorten it.
    pub fn start<T: Tickable + 'static>(target: Arc<T>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("timekeeper".to_string())
            .spawn(move || {
                log::debug!("timekeeper started");
                while !thread_shutdown.load(Ordering::Relaxed) {
                    target.tick(Instant::now());
                    thread::sleep(interval);
                }
                log::debug!("timekeeper stopped");
            })
            .expect("failed to spawn timekeeper thread");

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signals the thread and waits for it to exit.
    pub fn stop(mut self) {
        self._shutdown();
    }

    fn _shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Timekeeper {
    fn drop(&mut self) {
        self._shutdown();
    }
}
