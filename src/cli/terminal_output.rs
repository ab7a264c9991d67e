//! Live terminal reporting of provisioning events
//!
//! Each step gets a `[N/M] Step Name` header and a spinner while its
//! action runs; the spinner is replaced by a one-line result when the step
//! finishes. A separator spanning the terminal width closes the run.

use crate::cli::output::{create_spinner, format_execution_event, format_output, style};
use crate::execution::ExecutionEvent;
use indicatif::ProgressBar;
use std::sync::Mutex;

/// Prints execution events as they arrive
pub struct ConsoleReporter {
    show_output: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    /// `show_output` also prints the (truncated) output of completed steps
    pub fn new(show_output: bool) -> Self {
        Self {
            show_output,
            spinner: Mutex::new(None),
        }
    }

    pub fn handle(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StepStarted { name, .. } => {
                self.finish_spinner();
                println!("{}", format_execution_event(event));
                self.set_spinner(create_spinner(format!("{}...", name)));
            }
            ExecutionEvent::StepRetrying { .. } => {
                self.println(&format_execution_event(event));
            }
            ExecutionEvent::StepCompleted { output, .. } => {
                self.finish_spinner();
                println!("{}", format_execution_event(event));
                if self.show_output && !output.trim().is_empty() {
                    println!("{}", style(format_output(output.trim_end(), 5)).dim());
                }
            }
            ExecutionEvent::StepSkipped { .. }
            | ExecutionEvent::StepWarned { .. }
            | ExecutionEvent::StepFailed { .. } => {
                self.finish_spinner();
                println!("{}", format_execution_event(event));
            }
            ExecutionEvent::PipelineStarted { .. } => {
                println!("{}\n", format_execution_event(event));
            }
            ExecutionEvent::PipelineCompleted { .. } => {
                self.finish_spinner();
                print_separator();
                println!("{}", format_execution_event(event));
            }
        }
    }

    /// Stop and clear any running spinner (e.g. on interrupt)
    pub fn finish_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(spinner) = slot.take() {
                spinner.finish_and_clear();
            }
        }
    }

    fn set_spinner(&self, spinner: ProgressBar) {
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(spinner);
        }
    }

    /// Print a line above the spinner without breaking it
    fn println(&self, line: &str) {
        match self.spinner.lock() {
            Ok(slot) if slot.is_some() => {
                if let Some(spinner) = slot.as_ref() {
                    spinner.println(line);
                }
            }
            _ => println!("{}", line),
        }
    }
}

/// Print a horizontal rule spanning the terminal width
pub fn print_separator() {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    println!("{}", style("─".repeat(width)).dim());
}
