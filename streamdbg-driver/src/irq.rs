//! # Interrupt delivery
//!
//! A single background thread turns hardware events into callback
//! invocations. The thread is an explicit state machine:
//!
//! - **Idle-Disabled** — interrupts are off for the interface; the thread
//!   blocks on a wake flag until enabled or told to exit.
//! - **Armed** — the thread re-arms the hardware event source and blocks on
//!   it with a bounded timeout, so flag changes are observed within one
//!   poll period.
//! - **Exiting** — terminal; reached by shutdown, by an event-source I/O
//!   failure, or by an event arriving with nobody registered to service it.
//!
//! The engine and the thread share nothing but the two flags, the wake flag
//! and the callback slot; all transfer state stays single-threaded.

use std::io;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bound on how long the thread stays blocked in the hardware wait. This is
/// also the worst-case latency for disable and shutdown to take effect.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// The hardware event source the delivery thread blocks on.
///
/// Implementations wrap whatever the platform offers (for UIO: unmask the
/// interrupt by writing to the device file, then a timed poll plus a read of
/// the event counter).
pub trait EventSource: Send + 'static {
    /// Re-arms the source so the next hardware event becomes observable.
    fn rearm(&mut self) -> io::Result<()>;

    /// Blocks until an event fires or `timeout` elapses. `Ok(true)` means an
    /// event was delivered, `Ok(false)` means the wait timed out.
    fn wait(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// Callback invoked synchronously on the delivery thread for every event.
pub type InterruptCallback = Box<dyn FnMut() + Send + 'static>;

#[derive(Default)]
struct Flags {
    enabled: bool,
    shutdown: bool,
}

/// Wake flag with post-if-not-signalled semantics: posting an already
/// signalled flag is a no-op, and a wait consumes exactly one signal.
struct WakeFlag {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl WakeFlag {
    fn new() -> WakeFlag {
        WakeFlag {
            signalled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn post(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        if !*signalled {
            *signalled = true;
            self.condvar.notify_one();
        }
    }

    fn wait(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        while !*signalled {
            signalled = self.condvar.wait(signalled).unwrap();
        }
        *signalled = false;
    }
}

struct Shared {
    flags: RwLock<Flags>,
    wake: WakeFlag,
    callback: Mutex<Option<InterruptCallback>>,
}

/// Handle to the delivery thread for one hardware interface.
///
/// Dropping the handle shuts the thread down cooperatively: flag, wake,
/// join. A thread blocked in the hardware wait notices within
/// [`POLL_TIMEOUT`].
pub struct InterruptService {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl InterruptService {
    /// Starts the delivery thread in the Idle-Disabled state.
    ///
    /// Register the callback before enabling interrupts; an event delivered
    /// with no callback registered is fatal for the interface and stops
    /// delivery.
    pub fn spawn<E: EventSource>(events: E) -> io::Result<InterruptService> {
        let shared = Arc::new(Shared {
            flags: RwLock::new(Flags::default()),
            wake: WakeFlag::new(),
            callback: Mutex::new(None),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("streamdbg-irq".to_string())
            .spawn(move || delivery_loop(thread_shared, events))?;
        Ok(InterruptService {
            shared,
            thread: Some(thread),
        })
    }

    /// Installs the callback, replacing any earlier one. Returns whether a
    /// callback was already registered; replacing while the thread is armed
    /// is a caller hazard, not something this handle fences.
    pub fn register_callback(&self, callback: InterruptCallback) -> bool {
        let mut slot = self.shared.callback.lock().unwrap();
        let replaced = slot.is_some();
        if replaced {
            log::warn!("an interrupt callback was already registered; replacing it");
        }
        *slot = Some(callback);
        replaced
    }

    /// Moves the thread from Idle-Disabled to Armed.
    pub fn enable(&self) {
        self.shared.flags.write().unwrap().enabled = true;
        self.shared.wake.post();
    }

    /// Returns the thread to Idle-Disabled at its next loop-top check. An
    /// in-flight hardware wait is not preempted.
    pub fn disable(&self) {
        self.shared.flags.write().unwrap().enabled = false;
    }

    /// Stops the thread and waits for it to terminate.
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shared.flags.write().unwrap().shutdown = true;
            self.shared.wake.post();
            if thread.join().is_err() {
                log::error!("interrupt delivery thread panicked");
            }
        }
    }
}

impl Drop for InterruptService {
    fn drop(&mut self) {
        self.halt();
    }
}

fn delivery_loop<E: EventSource>(shared: Arc<Shared>, mut events: E) {
    loop {
        let (enabled, shutdown) = {
            let flags = shared.flags.read().unwrap();
            (flags.enabled, flags.shutdown)
        };
        if shutdown {
            break;
        }
        if !enabled {
            // Idle-Disabled: nothing to poll until enable or shutdown wakes us.
            shared.wake.wait();
            continue;
        }

        // Armed.
        if let Err(e) = events.rearm() {
            log::error!("failed to re-arm the hardware event source: {}", e);
            break;
        }
        match events.wait(POLL_TIMEOUT) {
            Ok(true) => {
                let mut slot = shared.callback.lock().unwrap();
                match slot.as_mut() {
                    Some(callback) => callback(),
                    None => {
                        log::error!(
                            "hardware event with no registered callback; stopping delivery"
                        );
                        break;
                    }
                }
            }
            Ok(false) => {} // Timeout: loop around and re-check the flags.
            Err(e) => {
                log::error!("hardware event wait failed: {}", e);
                break;
            }
        }
    }
    log::debug!("interrupt delivery thread exiting");
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Event source scripted from a list of wait outcomes; `None` entries
    /// time out, `Some` entries deliver or fail.
    struct Scripted {
        outcomes: std::vec::IntoIter<io::Result<bool>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<io::Result<bool>>) -> Scripted {
            Scripted {
                outcomes: outcomes.into_iter(),
            }
        }
    }

    impl EventSource for Scripted {
        fn rearm(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn wait(&mut self, _timeout: Duration) -> io::Result<bool> {
            self.outcomes.next().unwrap_or(Ok(false))
        }
    }

    #[test]
    fn events_invoke_the_callback() {
        let service =
            InterruptService::spawn(Scripted::new(vec![Ok(true), Ok(true)])).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        service.register_callback(Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        service.enable();
        while hits.load(Ordering::SeqCst) < 2 {
            thread::yield_now();
        }
        service.shutdown();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn event_without_callback_stops_delivery() {
        let service = InterruptService::spawn(Scripted::new(vec![Ok(true)])).unwrap();
        service.enable();
        // The thread exits on its own; shutdown only joins the corpse and
        // must return promptly.
        service.shutdown();
    }

    #[test]
    fn reregistration_reports_the_earlier_callback() {
        let service = InterruptService::spawn(Scripted::new(vec![])).unwrap();
        assert!(!service.register_callback(Box::new(|| {})));
        assert!(service.register_callback(Box::new(|| {})));
        service.shutdown();
    }

    #[test]
    fn shutdown_wakes_a_disabled_thread() {
        let service = InterruptService::spawn(Scripted::new(vec![])).unwrap();
        // Never enabled: the thread sits in Idle-Disabled on the wake flag.
        service.shutdown();
    }

    #[test]
    fn disable_returns_the_thread_to_idle() {
        let endless = (0..1024).map(|_| Ok(true)).collect();
        let service = InterruptService::spawn(Scripted::new(endless)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        service.register_callback(Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        service.enable();
        while hits.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }
        service.disable();
        // After disable is observed the count stops moving.
        let settled = {
            let mut last = hits.load(Ordering::SeqCst);
            loop {
                thread::sleep(Duration::from_millis(10));
                let now = hits.load(Ordering::SeqCst);
                if now == last {
                    break now;
                }
                last = now;
            }
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), settled);
        service.shutdown();
    }
}
