//! Fire-and-forget side calls.

use core::fmt::Display;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

/// A detached, best-effort task. Its outcome is logged and otherwise
/// ignored; nothing it does can reach the caller's state.
///
/// Dropping the handle does not cancel the task. Awaiting [`Detached::join`]
/// is only useful in tests and shutdown paths.
#[derive(Debug)]
pub struct Detached {
    what: &'static str,
    handle: JoinHandle<()>,
}

impl Detached {
    /// Spawn `fut` in the current span. Errors are logged at `warn` with
    /// `what` as context.
    pub fn spawn<F, T, E>(what: &'static str, fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Display,
    {
        let task = async move {
            match fut.await {
                Ok(_) => debug!(what, "best-effort task finished"),
                Err(error) => warn!(what, %error, "best-effort task failed"),
            }
        };
        Self {
            what,
            handle: tokio::spawn(task.in_current_span()),
        }
    }

    /// What the task is doing.
    pub const fn what(&self) -> &'static str {
        self.what
    }

    /// Wait for the task to finish. A panic inside the task is logged, not
    /// propagated.
    pub async fn join(self) {
        if let Err(error) = self.handle.await {
            warn!(what = self.what, %error, "best-effort task aborted");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn failures_do_not_escape() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = Detached::spawn("test", async move {
            flag.store(true, Ordering::SeqCst);
            Err::<(), _>("boom")
        });
        assert_eq!(task.what(), "test");
        task.join().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panics_do_not_escape() {
        Detached::spawn("panics", async {
            if true {
                panic!("inside detached task");
            }
            Ok::<(), String>(())
        })
        .join()
        .await;
    }
}
