//! User-facing build output.
//!
//! Build logs are read by people, so progress and warnings use the
//! platform's fixed prefixes instead of tracing's format. Diagnostics that
//! only matter when debugging the provisioner itself go through `tracing`.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

const STEP_PREFIX: &str = "-----> ";
const WARN_PREFIX: &str = " !     ";

/// Sink for step progress and warnings.
pub trait BuildOutput {
    /// Informational progress, e.g. `Installing python-3.11.9`.
    fn step(&self, message: &str);
    /// Non-fatal problem the app owner should act on.
    fn warn(&self, message: &str);
}

/// Writes steps to stdout and warnings to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl BuildOutput for ConsoleOutput {
    fn step(&self, message: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(format_step(message).as_bytes());
        let _ = out.flush();
    }

    fn warn(&self, message: &str) {
        let mut err = io::stderr().lock();
        let _ = err.write_all(format_warning(message).as_bytes());
        let _ = err.flush();
    }
}

#[must_use]
pub fn format_step(message: &str) -> String {
    format!("{STEP_PREFIX}{message}\n")
}

/// Prefix every line so multi-line warnings stay visually grouped.
#[must_use]
pub fn format_warning(message: &str) -> String {
    let mut rendered = String::new();
    for line in message.lines() {
        rendered.push_str(WARN_PREFIX);
        rendered.push_str(line);
        rendered.push('\n');
    }
    if rendered.is_empty() {
        rendered.push_str(WARN_PREFIX.trim_end());
        rendered.push('\n');
    }
    rendered
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Step(String),
    Warning(String),
}

/// Records output in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    events: Arc<Mutex<Vec<OutputEvent>>>,
}

impl CapturedOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<OutputEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OutputEvent::Step(message) => Some(message),
                OutputEvent::Warning(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OutputEvent::Warning(message) => Some(message),
                OutputEvent::Step(_) => None,
            })
            .collect()
    }

    fn push(&self, event: OutputEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl BuildOutput for CapturedOutput {
    fn step(&self, message: &str) {
        self.push(OutputEvent::Step(message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.push(OutputEvent::Warning(message.to_string()));
    }
}
