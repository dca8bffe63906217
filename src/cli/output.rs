//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars,
//! status-prefixed messages and the console side of a flash run.

use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::core::sink::FlashSink;

static QUIET: AtomicBool = AtomicBool::new(false);
static JSON: AtomicBool = AtomicBool::new(false);

/// Global output settings taken from the command line
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this configuration visible to [`is_quiet`] and [`is_json`]
    pub fn apply_global(&self) {
        QUIET.store(self.quiet, Ordering::Relaxed);
        JSON.store(self.json, Ordering::Relaxed);
    }

    /// tracing level implied by `-v` count
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    }
}

/// Whether `--quiet` is active
pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Whether `--json` is active
pub fn is_json() -> bool {
    JSON.load(Ordering::Relaxed)
}

pub fn print_info(message: &str) {
    if !is_quiet() && !is_json() {
        println!("{} {message}", status::INFO);
    }
}

pub fn print_success(message: &str) {
    if !is_quiet() && !is_json() {
        println!("{} {message}", status::SUCCESS);
    }
}

/// Warnings go to stderr and are shown even in quiet mode
pub fn print_warning(message: &str) {
    if !is_json() {
        eprintln!("{} {message}", status::WARNING);
    }
}

/// Indented detail line under a status message
pub fn print_detail(message: &str) {
    if !is_quiet() && !is_json() {
        println!("  {message}");
    }
}

/// Print an error and its cause chain
pub fn display_error(error: &anyhow::Error) {
    if is_json() {
        let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        let json = serde_json::json!({
            "status": "error",
            "error": error.to_string(),
            "causes": causes,
        });
        eprintln!("{json}");
        return;
    }

    eprintln!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    if is_quiet() || is_json() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Create a progress bar for plan steps
pub fn create_flash_bar(total: u64) -> ProgressBar {
    if is_quiet() || is_json() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} steps ({msg})")
    {
        pb.set_style(style.progress_chars("█▓▒░"));
    }
    pb
}

/// [`FlashSink`] that drives a progress bar and optionally tees the log to a file
pub struct ConsoleSink {
    bar: ProgressBar,
    log_file: Option<Mutex<BufWriter<File>>>,
}

impl ConsoleSink {
    pub fn new(total_steps: usize) -> Self {
        Self {
            bar: create_flash_bar(total_steps as u64),
            log_file: None,
        }
    }

    /// Also append every log line to `path`
    pub fn with_log_file(mut self, path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options().create(true).append(true).open(path)?;
        self.log_file = Some(Mutex::new(BufWriter::new(file)));
        Ok(self)
    }

    /// Remove the progress bar
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        self.flush();
    }

    fn flush(&self) {
        if let Some(file) = &self.log_file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = file.flush() {
                tracing::warn!("failed to flush log file: {}", e);
            }
        }
    }
}

impl FlashSink for ConsoleSink {
    fn log(&self, line: &str) {
        if let Some(file) = &self.log_file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = writeln!(file, "{line}") {
                tracing::warn!("failed to write log file: {}", e);
            }
        }

        if is_json() {
            return;
        }
        if self.bar.is_hidden() {
            if !is_quiet() {
                println!("{line}");
            }
        } else {
            self.bar.println(line);
        }
    }

    fn progress(&self, current: usize, total: usize, percent: u8) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
        self.bar.set_message(format!("{percent}%"));
    }
}

impl Drop for ConsoleSink {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}
