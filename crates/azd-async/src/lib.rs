//! Long-running operations that report progress and pause for user input.
//!
//! A [`Task`] runs its body on a spawned tokio task. The body receives a
//! [`TaskContext`] to push progress and to bracket prompts with
//! [`TaskContext::interact`]. The caller drains [`TaskEvent`]s in the order
//! they were emitted and finally awaits the result.

pub mod error;
pub mod task;

pub use error::TaskError;
pub use task::{Task, TaskContext, TaskEvent};
