use std::any::Any;
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::TaskError;

/// Something the task body reported while running.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent<P> {
    Progress(P),
    /// `true` right before a prompt, `false` once it has returned.
    Interactive(bool),
}

/// Handed to the task body for reporting.
///
/// Cloning is cheap. The event stream ends once the body and every clone
/// have been dropped.
#[derive(Debug)]
pub struct TaskContext<P> {
    events: mpsc::UnboundedSender<TaskEvent<P>>,
}

impl<P> Clone for TaskContext<P> {
    fn clone(&self) -> Self {
        Self { events: self.events.clone() }
    }
}

impl<P: Send + 'static> TaskContext<P> {
    pub fn set_progress(&self, progress: P) {
        // The consumer may have stopped listening; progress is advisory.
        let _ = self.events.send(TaskEvent::Progress(progress));
    }

    /// Run `prompt` between `Interactive(true)` and `Interactive(false)`.
    ///
    /// The closing `false` is emitted when the prompt returns, fails, or
    /// unwinds, so a consumer never stays in interactive mode.
    pub async fn interact<T, E, F, Fut>(&self, prompt: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _guard = InteractiveGuard::enter(&self.events);
        prompt().await
    }
}

struct InteractiveGuard<'a, P> {
    events: &'a mpsc::UnboundedSender<TaskEvent<P>>,
}

impl<'a, P> InteractiveGuard<'a, P> {
    fn enter(events: &'a mpsc::UnboundedSender<TaskEvent<P>>) -> Self {
        let _ = events.send(TaskEvent::Interactive(true));
        Self { events }
    }
}

impl<P> Drop for InteractiveGuard<'_, P> {
    fn drop(&mut self) {
        let _ = self.events.send(TaskEvent::Interactive(false));
    }
}

/// A running operation yielding events of type `P` and finally `Result<R, E>`.
pub struct Task<R, P, E> {
    events: mpsc::UnboundedReceiver<TaskEvent<P>>,
    handle: JoinHandle<Result<R, E>>,
}

impl<R, P, E> Task<R, P, E>
where
    R: Send + 'static,
    P: Send + 'static,
    E: From<TaskError> + Send + 'static,
{
    /// Spawn `body` on the current tokio runtime.
    pub fn run<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext<P>) -> Fut,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(body(TaskContext { events: tx }));
        Self { events: rx, handle }
    }

    /// A task that has already finished with `result` and emits no events.
    pub fn from_result(result: Result<R, E>) -> Self {
        Self::run(move |_ctx| async move { result })
    }

    /// Next event in emission order, or `None` once the body has finished.
    pub async fn next_event(&mut self) -> Option<TaskEvent<P>> {
        self.events.recv().await
    }

    /// Wait for the body to finish. Undrained events are discarded.
    pub async fn wait(self) -> Result<R, E> {
        drop(self.events);
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                debug!(%message, "task body panicked");
                Err(E::from(TaskError::Panicked(message)))
            }
            Err(_) => Err(E::from(TaskError::Cancelled)),
        }
    }

    /// Drain every event, then wait for the result.
    pub async fn collect(mut self) -> (Vec<TaskEvent<P>>, Result<R, E>) {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        let result = self.wait().await;
        (events, result)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
