//! Shared cancellation state for one pipeline run.
//!
//! Every stage holds an `Arc<Cancellation>`. The first failure recorded wins and
//! flips the pipeline into the cancelled state; blocked `select!` calls wake up
//! because the broadcast sender is dropped.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ParseError;

pub(crate) struct Cancellation {
    cancelled: AtomicBool,
    deadline: Option<(Instant, Duration)>,
    first_error: Mutex<Option<anyhow::Error>>,
    // Never sent on; dropping it disconnects every clone of `signal_rx`.
    signal_tx: Mutex<Option<Sender<()>>>,
    signal_rx: Receiver<()>,
}

impl Cancellation {
    pub fn new(timeout: Option<Duration>) -> Self {
        let (signal_tx, signal_rx) = bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            deadline: timeout.map(|t| (Instant::now() + t, t)),
            first_error: Mutex::new(None),
            signal_tx: Mutex::new(Some(signal_tx)),
            signal_rx,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut tx) = self.signal_tx.lock() {
            tx.take();
        }
    }

    /// Record `err` if it is the first failure, then cancel. Returns whether the
    /// error was kept.
    pub fn fail(&self, err: anyhow::Error) -> bool {
        let kept = match self.first_error.lock() {
            Ok(mut slot) if slot.is_none() => {
                *slot = Some(err);
                true
            }
            _ => false,
        };
        self.cancel();
        kept
    }

    /// Record a deadline failure if the deadline has passed.
    pub fn check_deadline(&self) -> bool {
        match self.deadline {
            Some((at, timeout)) if Instant::now() >= at => {
                tracing::warn!(?timeout, "parse deadline exceeded, cancelling pipeline");
                self.fail(ParseError::DeadlineExceeded(timeout).into());
                true
            }
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn has_error(&self) -> bool {
        self.first_error
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(true)
    }

    /// Ready (disconnected) once the pipeline is cancelled.
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal_rx
    }

    /// Fires once at the deadline, or never when no timeout is configured.
    pub fn deadline_rx(&self) -> Receiver<Instant> {
        match self.deadline {
            Some((at, _)) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        }
    }

    pub fn take_error(&self) -> Option<anyhow::Error> {
        self.first_error.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_first_error_wins() {
        let cancel = Cancellation::new(None);
        assert!(!cancel.is_cancelled());
        assert!(cancel.fail(anyhow!("first")));
        assert!(!cancel.fail(anyhow!("second")));
        assert!(cancel.is_cancelled());
        assert_eq!(cancel.take_error().unwrap().to_string(), "first");
    }

    #[test]
    fn test_signal_disconnects_on_cancel() {
        let cancel = Cancellation::new(None);
        assert_eq!(
            cancel.signal().try_recv(),
            Err(crossbeam_channel::TryRecvError::Empty)
        );
        cancel.cancel();
        assert_eq!(
            cancel.signal().recv(),
            Err(crossbeam_channel::RecvError),
            "receiver should be disconnected after cancel"
        );
    }

    #[test]
    fn test_deadline_records_error() {
        let cancel = Cancellation::new(Some(Duration::from_millis(0)));
        assert!(cancel.check_deadline());
        let err = cancel.take_error().unwrap();
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::DeadlineExceeded(_))
        ));
    }

    #[test]
    fn test_no_deadline_never_fires() {
        let cancel = Cancellation::new(None);
        assert!(!cancel.check_deadline());
        assert!(cancel
            .deadline_rx()
            .recv_timeout(Duration::from_millis(5))
            .is_err());
    }
}
