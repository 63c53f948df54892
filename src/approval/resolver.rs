//! One-shot resolution cell shared by every trigger of an approval session.
//!
//! The approve and deny handlers, the expiry timer and the cancellation
//! listener all race to call [`Resolver::resolve`]. The sender slot is taken
//! under a mutex, so exactly one caller records an outcome; the rest see
//! `false` and change nothing. Recording an outcome also cancels the shutdown
//! token that the HTTP listener is serving under.

use super::ApprovalError;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Terminal state of an approval session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Approved,
    Denied,
    Expired,
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Approved => "approved",
            Outcome::Denied => "denied",
            Outcome::Expired => "expired",
            Outcome::Cancelled => "cancelled",
        }
    }

    /// `Ok` only for an affirmative approval
    pub fn into_result(self) -> Result<(), ApprovalError> {
        match self {
            Outcome::Approved => Ok(()),
            Outcome::Denied => Err(ApprovalError::Denied),
            Outcome::Expired => Err(ApprovalError::Expired),
            Outcome::Cancelled => Err(ApprovalError::Cancelled),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Resolver {
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
    recorded: OnceLock<Outcome>,
    shutdown: CancellationToken,
}

impl Resolver {
    /// New unresolved cell plus the receiver `wait()` blocks on
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let resolver = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            recorded: OnceLock::new(),
            shutdown: CancellationToken::new(),
        });
        (resolver, rx)
    }

    /// Record `outcome` if nothing was recorded yet. Returns whether this call won.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        let mut slot = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = slot.take() else {
            tracing::debug!(%outcome, "ignoring late resolution");
            return false;
        };
        let _ = self.recorded.set(outcome);
        drop(slot);

        self.shutdown.cancel();
        // The receiver may already be gone if the server was dropped unwaited
        let _ = sender.send(outcome);
        tracing::info!(%outcome, "approval resolved");
        true
    }

    /// The recorded outcome, once there is one
    pub fn outcome(&self) -> Option<Outcome> {
        self.recorded.get().copied()
    }

    /// Token cancelled by the first resolution
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let (resolver, rx) = Resolver::new();

        assert!(resolver.resolve(Outcome::Approved));
        assert!(!resolver.resolve(Outcome::Denied));
        assert!(!resolver.resolve(Outcome::Expired));

        assert_eq!(rx.await.unwrap(), Outcome::Approved);
        assert_eq!(resolver.outcome(), Some(Outcome::Approved));
        assert!(resolver.shutdown_token().is_cancelled());
    }

    #[test]
    fn test_concurrent_resolvers_record_once() {
        let (resolver, mut rx) = Resolver::new();
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = [
            Outcome::Approved,
            Outcome::Denied,
            Outcome::Expired,
            Outcome::Cancelled,
        ]
        .into_iter()
        .cycle()
        .take(32)
        .map(|outcome| {
            let resolver = Arc::clone(&resolver);
            let wins = Arc::clone(&wins);
            thread::spawn(move || {
                if resolver.resolve(outcome) {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        let delivered = rx.try_recv().unwrap();
        assert_eq!(Some(delivered), resolver.outcome());
    }

    #[test]
    fn test_resolve_after_receiver_dropped() {
        let (resolver, rx) = Resolver::new();
        drop(rx);
        assert!(resolver.resolve(Outcome::Cancelled));
        assert_eq!(resolver.outcome(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_outcome_results() {
        assert!(Outcome::Approved.into_result().is_ok());
        assert!(matches!(Outcome::Denied.into_result(), Err(ApprovalError::Denied)));
        assert!(matches!(Outcome::Expired.into_result(), Err(ApprovalError::Expired)));
        assert!(matches!(Outcome::Cancelled.into_result(), Err(ApprovalError::Cancelled)));
    }
}
