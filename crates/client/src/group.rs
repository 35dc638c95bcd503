//! First-failure-wins task group.

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs tasks concurrently and waits for all of them.
///
/// The first task to fail fires the group's token, so siblings watching it
/// unwind at their next blocking point, and its error becomes the group's
/// result. Errors from tasks failing afterwards are dropped. Which of two
/// tasks failing at the same moment wins is not defined.
///
/// Dropping the group aborts tasks still running.
pub struct TaskGroup<T, E> {
    tasks: JoinSet<Result<T, E>>,
    cancel: CancellationToken,
}

impl<T, E> TaskGroup<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
        }
    }

    /// Token fired when any task fails.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Waits for every task. Returns all outputs in completion order, or
    /// the first error.
    pub async fn wait(mut self) -> Result<Vec<T>, E> {
        let mut outputs = Vec::with_capacity(self.tasks.len());
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        self.cancel.cancel();
                        first_error = Some(e);
                    } else {
                        debug!("task failed after the group was already cancelled");
                    }
                }
                Err(join_err) if join_err.is_panic() => {
                    self.cancel.cancel();
                    std::panic::resume_unwind(join_err.into_panic());
                }
                Err(_) => {}
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }
}
