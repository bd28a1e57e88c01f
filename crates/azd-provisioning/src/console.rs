use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProvisionError;

/// What to ask and how to present it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsoleOptions {
    pub message: String,
    pub help: Option<String>,
    /// Choices for [`Console::select`].
    pub options: Vec<String>,
    pub default_value: Option<Value>,
    /// Hide the typed value.
    pub secret: bool,
}

impl ConsoleOptions {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Default::default() }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        let help = help.into();
        self.help = (!help.is_empty()).then_some(help);
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// Terminal interaction used by providers and the manager.
///
/// The spinner is a single line with a title. `show_spinner` starts it or
/// replaces the title of the running one.
#[async_trait]
pub trait Console: Send + Sync + 'static {
    fn message(&self, message: &str);

    async fn confirm(&self, options: ConsoleOptions) -> Result<bool, ProvisionError>;

    async fn prompt(&self, options: ConsoleOptions) -> Result<String, ProvisionError>;

    /// Index into `options.options`.
    async fn select(&self, options: ConsoleOptions) -> Result<usize, ProvisionError>;

    fn show_spinner(&self, title: &str);

    fn stop_spinner(&self);

    fn is_spinner_running(&self) -> bool;
}

// ── Scripted console ──────────────────────────────────────────────────────────

/// Everything a [`ScriptedConsole`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    Message(String),
    Confirm(String),
    Prompt(String),
    Select(String),
    SpinnerShown(String),
    SpinnerStopped,
}

#[derive(Debug, Default)]
struct Script {
    confirms: VecDeque<bool>,
    prompts: VecDeque<String>,
    selects: VecDeque<usize>,
    events: Vec<ConsoleEvent>,
    spinning: bool,
}

/// A [`Console`] that answers from pre-loaded queues and records every call.
///
/// Running out of answers is an error, so an unexpected prompt fails the
/// operation under test instead of hanging it.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConsole {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm_with(self, answer: bool) -> Self {
        self.with_script(|s| s.confirms.push_back(answer));
        self
    }

    pub fn prompt_with(self, answer: impl Into<String>) -> Self {
        let answer = answer.into();
        self.with_script(|s| s.prompts.push_back(answer));
        self
    }

    pub fn select_with(self, index: usize) -> Self {
        self.with_script(|s| s.selects.push_back(index));
        self
    }

    pub fn events(&self) -> Vec<ConsoleEvent> {
        self.with_script(|s| s.events.clone())
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ConsoleEvent::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Messages of every confirm, prompt and select, in order.
    pub fn questions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ConsoleEvent::Confirm(m) | ConsoleEvent::Prompt(m) | ConsoleEvent::Select(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut guard = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn unanswered(kind: &str, message: &str) -> ProvisionError {
        ProvisionError::Console(format!("no scripted {} answer for '{}'", kind, message))
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    fn message(&self, message: &str) {
        self.with_script(|s| s.events.push(ConsoleEvent::Message(message.to_string())));
    }

    async fn confirm(&self, options: ConsoleOptions) -> Result<bool, ProvisionError> {
        self.with_script(|s| {
            s.events.push(ConsoleEvent::Confirm(options.message.clone()));
            s.confirms.pop_front()
        })
        .ok_or_else(|| Self::unanswered("confirm", &options.message))
    }

    async fn prompt(&self, options: ConsoleOptions) -> Result<String, ProvisionError> {
        self.with_script(|s| {
            s.events.push(ConsoleEvent::Prompt(options.message.clone()));
            s.prompts.pop_front()
        })
        .ok_or_else(|| Self::unanswered("prompt", &options.message))
    }

    async fn select(&self, options: ConsoleOptions) -> Result<usize, ProvisionError> {
        let index = self
            .with_script(|s| {
                s.events.push(ConsoleEvent::Select(options.message.clone()));
                s.selects.pop_front()
            })
            .ok_or_else(|| Self::unanswered("select", &options.message))?;
        if index >= options.options.len() {
            return Err(ProvisionError::Console(format!(
                "scripted selection {} out of range for '{}'",
                index, options.message
            )));
        }
        Ok(index)
    }

    fn show_spinner(&self, title: &str) {
        self.with_script(|s| {
            s.spinning = true;
            s.events.push(ConsoleEvent::SpinnerShown(title.to_string()));
        });
    }

    fn stop_spinner(&self) {
        self.with_script(|s| {
            if s.spinning {
                s.spinning = false;
                s.events.push(ConsoleEvent::SpinnerStopped);
            }
        });
    }

    fn is_spinner_running(&self) -> bool {
        self.with_script(|s| s.spinning)
    }
}
