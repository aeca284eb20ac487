//! SIGINT handling for the interactive loop.
//!
//! The signal handler only writes one byte to a pipe; a dedicated thread reads
//! that pipe and runs the callback, so the callback is free to lock, allocate,
//! and write to the terminal. Children get the default disposition back when
//! they exec, so Ctrl-C still stops a foreground program while the shell just
//! redraws its prompt.

use anyhow::{Context, Result, bail};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::io::{self, PipeWriter, Read, Write};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::{self, JoinHandle};

/// Write end of the wake-up pipe, or -1 when no listener is installed.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
/// Set while a listener owns the SIGINT disposition.
static ACTIVE: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = 1u8;
        // SAFETY: write(2) is async-signal-safe and `byte` outlives the call.
        unsafe {
            libc::write(fd, (&byte as *const u8).cast(), 1);
        }
    }
}

/// Process-wide SIGINT listener. Only one can be installed at a time.
///
/// Dropping the listener restores the previous SIGINT disposition and joins
/// its thread.
pub struct InterruptListener {
    waker: PipeWriter,
    stopping: Arc<AtomicBool>,
    previous: SigAction,
    thread: Option<JoinHandle<()>>,
}

impl InterruptListener {
    /// Install the SIGINT handler and start the thread that calls
    /// `on_interrupt` once per received signal.
    pub fn start<F>(on_interrupt: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("an interrupt listener is already installed");
        }
        Self::install(on_interrupt).inspect_err(|_| ACTIVE.store(false, Ordering::SeqCst))
    }

    fn install<F>(on_interrupt: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (mut wake, waker) = io::pipe().context("cannot create interrupt pipe")?;
        let stopping = Arc::new(AtomicBool::new(false));

        let thread = {
            let stopping = Arc::clone(&stopping);
            thread::Builder::new()
                .name("interrupt-listener".to_string())
                .spawn(move || {
                    let mut byte = [0u8; 1];
                    loop {
                        match wake.read(&mut byte) {
                            Ok(0) => break,
                            Ok(_) if stopping.load(Ordering::SeqCst) => break,
                            Ok(_) => {
                                tracing::trace!("interrupt received");
                                on_interrupt();
                            }
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                            Err(e) => {
                                tracing::warn!(error = %e, "interrupt pipe failed");
                                break;
                            }
                        }
                    }
                })
                .context("cannot spawn interrupt listener")?
        };

        WAKE_FD.store(waker.as_raw_fd(), Ordering::SeqCst);
        let action = SigAction::new(
            SigHandler::Handler(on_sigint),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only performs an async-signal-safe write(2).
        let previous = match unsafe { sigaction(Signal::SIGINT, &action) } {
            Ok(previous) => previous,
            Err(e) => {
                WAKE_FD.store(-1, Ordering::SeqCst);
                stopping.store(true, Ordering::SeqCst);
                drop(waker);
                let _ = thread.join();
                return Err(e).context("cannot install SIGINT handler");
            }
        };
        tracing::debug!("interrupt listener installed");

        Ok(Self {
            waker,
            stopping,
            previous,
            thread: Some(thread),
        })
    }

    /// Restore the previous disposition and wait for the listener thread.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for InterruptListener {
    fn drop(&mut self) {
        // SAFETY: reinstalls the disposition that was in place before start().
        if let Err(e) = unsafe { sigaction(Signal::SIGINT, &self.previous) } {
            tracing::warn!(error = %e, "cannot restore SIGINT disposition");
        }
        WAKE_FD.store(-1, Ordering::SeqCst);
        self.stopping.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.write_all(&[0]) {
            tracing::debug!(error = %e, "cannot wake interrupt listener");
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("interrupt callback panicked");
            }
        }
        ACTIVE.store(false, Ordering::SeqCst);
        tracing::debug!("interrupt listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;
    use std::sync::mpsc;
    use std::time::Duration;

    // One test so no other listener can be active in this process meanwhile.
    #[test]
    fn test_listener_lifecycle() {
        let (tx, rx) = mpsc::channel();
        let listener = InterruptListener::start(move || {
            let _ = tx.send(());
        })
        .unwrap();

        assert!(InterruptListener::start(|| {}).is_err());

        for _ in 0..2 {
            raise(Signal::SIGINT).unwrap();
            rx.recv_timeout(Duration::from_secs(10))
                .expect("callback not invoked");
        }

        listener.stop();
        // The callback (and its sender) went away with the thread.
        assert!(rx.recv_timeout(Duration::from_secs(10)).is_err());

        let again = InterruptListener::start(|| {}).expect("restart after stop");
        drop(again);
    }
}
