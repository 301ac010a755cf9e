//! First-exit-wins task pairing
//!
//! Generic combinator that runs two futures as one unit: whichever
//! finishes first - success or failure - wins, the sibling is cancelled
//! and waited for, and the winner's output is returned. Not chat-specific;
//! the handler uses it to bind each session's receive and send loops.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::trace;

/// Aborts the wrapped task when dropped, so cancelling the combinator
/// cancels both children.
#[derive(Debug)]
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `a` and `b` in parallel until either one finishes.
///
/// The first task to finish decides the outcome: its output is returned
/// as-is (for `Result` outputs this returns the success or propagates the
/// failure), and the sibling is aborted and then awaited, so this function
/// never returns before both tasks have stopped. Aborting a task that has
/// already finished is a no-op. A panic in either task resumes on the
/// caller. If the returned future is itself dropped, both tasks are
/// aborted.
pub async fn concurrently<T>(
    a: impl Future<Output = T> + Send + 'static,
    b: impl Future<Output = T> + Send + 'static,
) -> T
where
    T: Send + 'static,
{
    let mut a = AbortOnDrop(tokio::spawn(a));
    let mut b = AbortOnDrop(tokio::spawn(b));

    let (first, loser) = tokio::select! {
        res = &mut a.0 => (res, &mut b),
        res = &mut b.0 => (res, &mut a),
    };

    loser.0.abort();
    let _ = (&mut loser.0).await;
    trace!("Both session tasks stopped");

    match first {
        Ok(output) => output,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        // The handles never leave this function, so the winner can only be
        // cancelled when the runtime itself is shutting down.
        Err(err) => panic!("session task cancelled outside the pair: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    /// Sets the flag when dropped, i.e. when the owning future is
    /// cancelled or finishes.
    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let result: Result<u32, &str> = concurrently(
            async { Ok(1) },
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(2)
            },
        )
        .await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn test_first_failure_propagates() {
        let result: Result<u32, &str> = concurrently(
            async {
                std::future::pending::<()>().await;
                unreachable!()
            },
            async { Err("boom") },
        )
        .await;
        assert_eq!(result, Err("boom"));
    }

    #[tokio::test]
    async fn test_sibling_is_stopped_before_return() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let witness = SetOnDrop(Arc::clone(&cancelled));

        let result: Result<u32, &str> = concurrently(async { Ok(7) }, async move {
            let _witness = witness;
            std::future::pending::<()>().await;
            unreachable!()
        })
        .await;

        assert_eq!(result, Ok(7));
        // the loser was aborted and awaited, so its locals are gone
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    #[should_panic(expected = "kaboom")]
    async fn test_panic_resumes_on_caller() {
        let _: Result<u32, &str> = concurrently(
            async { panic!("kaboom") },
            async {
                std::future::pending::<()>().await;
                unreachable!()
            },
        )
        .await;
    }
}
