use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use azd_provisioning::{Console, ConsoleOptions, ProvisionError};
use dialoguer::{Confirm, Input, Password, Select};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

/// [`Console`] on the user's terminal: dialoguer prompts and one indicatif
/// spinner line.
///
/// With `no_prompt` set nothing is ever asked. Questions with a default
/// answer get it; the rest fail.
pub struct TerminalConsole {
    no_prompt: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalConsole {
    pub fn new(no_prompt: bool) -> Self {
        Self { no_prompt, spinner: Mutex::new(None) }
    }

    fn spinner(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        match self.spinner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn no_answer(options: &ConsoleOptions) -> ProvisionError {
        ProvisionError::Console(format!(
            "no default response for prompt '{}' and prompting is disabled (--no-prompt)",
            options.message
        ))
    }

    fn show_help(&self, options: &ConsoleOptions) {
        if let Some(help) = &options.help {
            self.message(&format!("  {}", help));
        }
    }
}

/// Run a blocking dialoguer interaction off the async runtime.
async fn blocking<T, F>(interaction: F) -> Result<T, ProvisionError>
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(interaction)
        .await
        .map_err(|e| ProvisionError::Console(e.to_string()))?
        .map_err(|e| ProvisionError::Console(e.to_string()))
}

fn default_text(options: &ConsoleOptions) -> Option<String> {
    match options.default_value.as_ref()? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The default choice as an index: either the default value names one of
/// the options or it is the index itself.
fn default_index(options: &ConsoleOptions) -> Option<usize> {
    match options.default_value.as_ref()? {
        Value::String(s) => options.options.iter().position(|o| o == s),
        Value::Number(n) => n.as_u64().map(|i| i as usize).filter(|i| *i < options.options.len()),
        _ => None,
    }
}

#[async_trait]
impl Console for TerminalConsole {
    fn message(&self, message: &str) {
        match self.spinner().as_ref() {
            Some(spinner) => spinner.println(message),
            None => println!("{}", message),
        }
    }

    async fn confirm(&self, options: ConsoleOptions) -> Result<bool, ProvisionError> {
        let default = options.default_value.as_ref().and_then(Value::as_bool);
        if self.no_prompt {
            return default.ok_or_else(|| Self::no_answer(&options));
        }

        self.show_help(&options);
        blocking(move || {
            Confirm::new()
                .with_prompt(options.message)
                .default(default.unwrap_or(false))
                .interact()
        })
        .await
    }

    async fn prompt(&self, options: ConsoleOptions) -> Result<String, ProvisionError> {
        let default = default_text(&options);
        if self.no_prompt {
            return default.ok_or_else(|| Self::no_answer(&options));
        }

        self.show_help(&options);
        if options.secret {
            return blocking(move || Password::new().with_prompt(options.message).interact()).await;
        }
        blocking(move || {
            let mut input = Input::<String>::new().with_prompt(options.message);
            if let Some(default) = default {
                input = input.default(default);
            }
            input.interact_text()
        })
        .await
    }

    async fn select(&self, options: ConsoleOptions) -> Result<usize, ProvisionError> {
        if options.options.is_empty() {
            return Err(ProvisionError::Console(format!("nothing to select for '{}'", options.message)));
        }
        let default = default_index(&options);
        if self.no_prompt {
            return default.ok_or_else(|| Self::no_answer(&options));
        }

        self.show_help(&options);
        blocking(move || {
            Select::new()
                .with_prompt(options.message)
                .items(&options.options)
                .default(default.unwrap_or(0))
                .interact()
        })
        .await
    }

    fn show_spinner(&self, title: &str) {
        let mut spinner = self.spinner();
        match spinner.as_ref() {
            Some(running) => running.set_message(title.to_string()),
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.set_message(title.to_string());
                bar.enable_steady_tick(Duration::from_millis(120));
                *spinner = Some(bar);
            }
        }
    }

    fn stop_spinner(&self) {
        if let Some(bar) = self.spinner().take() {
            bar.finish_and_clear();
        }
    }

    fn is_spinner_running(&self) -> bool {
        self.spinner().is_some()
    }
}
