//! Terminal rendering of pipeline progress.

use std::io::IsTerminal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use buildrelay_core::{
    PipelineObserver, ProgressEvent, RelayConfig, TracingObserver, UselessFactsApi,
};
use indicatif::{ProgressBar, ProgressStyle};

const SPINNER_TICK: Duration = Duration::from_millis(120);

/// Log lines for every event, plus a spinner while a poll loop waits.
///
/// The spinner ticks on its own thread and is purely cosmetic.
pub struct ConsoleObserver {
    inner: TracingObserver,
    spinner_enabled: bool,
    active: Mutex<Option<ProgressBar>>,
}

impl ConsoleObserver {
    pub fn new(inner: TracingObserver, spinner_enabled: bool) -> Self {
        Self {
            inner,
            spinner_enabled,
            active: Mutex::new(None),
        }
    }

    /// Observer for an interactive run of `config`.
    pub fn for_config(config: &RelayConfig, json: bool) -> Arc<Self> {
        let mut inner = TracingObserver::new();
        if config.fun_facts {
            inner = inner.with_facts(Arc::new(UselessFactsApi::new()));
        }
        let spinner_enabled = !json && std::io::stderr().is_terminal();
        Arc::new(Self::new(inner, spinner_enabled))
    }

    pub fn is_spinning(&self) -> bool {
        self.active.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn start_spinner(&self, label: &str) {
        let Ok(mut slot) = self.active.lock() else {
            return;
        };
        if let Some(previous) = slot.take() {
            previous.finish_and_clear();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
            spinner.set_style(style);
        }
        spinner.set_message(label.to_string());
        spinner.enable_steady_tick(SPINNER_TICK);
        *slot = Some(spinner);
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.active.lock() {
            if let Some(spinner) = slot.take() {
                spinner.finish_and_clear();
            }
        }
    }
}

impl PipelineObserver for ConsoleObserver {
    fn on_event(&self, event: &ProgressEvent) {
        if let ProgressEvent::WaitFinished = event {
            self.stop_spinner();
        }

        // Log lines are written with the spinner hidden so they don't interleave.
        let spinner = self.active.lock().ok().and_then(|s| s.clone());
        match spinner {
            Some(spinner) => spinner.suspend(|| self.inner.on_event(event)),
            None => self.inner.on_event(event),
        }

        if let ProgressEvent::WaitStarted { label } = event {
            if self.spinner_enabled {
                self.start_spinner(label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_started() -> ProgressEvent {
        ProgressEvent::WaitStarted {
            label: "Waiting in build queue".to_string(),
        }
    }

    #[test]
    fn test_disabled_spinner_never_starts() {
        let observer = ConsoleObserver::new(TracingObserver::new(), false);
        observer.on_event(&wait_started());
        assert!(!observer.is_spinning());
    }

    #[test]
    fn test_spinner_spans_one_wait() {
        let observer = ConsoleObserver::new(TracingObserver::new(), true);
        observer.on_event(&wait_started());
        assert!(observer.is_spinning());

        observer.on_event(&ProgressEvent::StillQueued {
            minutes: 15,
            why: None,
        });
        assert!(observer.is_spinning());

        observer.on_event(&ProgressEvent::WaitFinished);
        assert!(!observer.is_spinning());
    }
}
