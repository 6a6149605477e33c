//! # Send Context
//!
//! Caller-supplied cancellation scope for send operations. A send checks the
//! context before any transport call and races every transport call against
//! it; a lost race drops the call and returns `DispatchError::Cancelled`.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::domain::errors::DispatchError;

/// Cancellation signal and optional deadline for one send.
#[derive(Debug, Clone, Default)]
pub struct SendContext {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Owner side of a cancellable context.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every context derived from this handle.
    pub fn cancel(&self) {
        // Receivers may all be gone already.
        let _ = self.sender.send(true);
    }
}

impl SendContext {
    /// Never cancelled, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled through the returned handle.
    pub fn cancellable() -> (CancelHandle, Self) {
        let (sender, receiver) = watch::channel(false);
        (CancelHandle { sender }, Self::with_cancel(receiver))
    }

    /// A context cancelled when `signal` turns `true`.
    pub fn with_cancel(signal: watch::Receiver<bool>) -> Self {
        Self {
            cancel: Some(signal),
            deadline: None,
        }
    }

    /// Add a deadline `timeout` from now. An earlier deadline is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Add a deadline. An earlier deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Whether the signal fired or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        let signalled = self.cancel.as_ref().is_some_and(|rx| *rx.borrow());
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        signalled || expired
    }

    /// `Err(Cancelled)` if the context is already done.
    pub fn check(&self) -> Result<(), DispatchError> {
        if self.is_cancelled() {
            Err(DispatchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `operation` unless the context finishes first.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, DispatchError>
    where
        F: Future<Output = Result<T, DispatchError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(DispatchError::Cancelled),
            result = operation => result,
        }
    }

    /// Resolves once the context is done; pending forever for `background`.
    async fn cancelled(&self) {
        let signal = async {
            match self.cancel.clone() {
                Some(mut rx) => loop {
                    let fired = *rx.borrow_and_update();
                    if fired {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Handle dropped without cancelling.
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = signal => {}
            _ = deadline => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = SendContext::background();
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.run(async { Ok(7) }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_polls_operation() {
        let (handle, ctx) = SendContext::cancellable();
        handle.cancel();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result = ctx
            .run(async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(result, Err(DispatchError::Cancelled));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_during_operation() {
        let (handle, ctx) = SendContext::cancellable();
        let run = ctx.run(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel);
        assert_eq!(result, Err(DispatchError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = SendContext::background().with_timeout(Duration::from_millis(50));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(DispatchError::Cancelled));
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = SendContext::background()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline, Some(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (handle, ctx) = SendContext::cancellable();
        drop(handle);
        assert_eq!(ctx.run(async { Ok(1) }).await, Ok(1));
    }
}
