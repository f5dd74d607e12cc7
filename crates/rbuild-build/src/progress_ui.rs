//! Progress UI components for build visualization
//!
//! Renders the [`StatusUpdate`] stream of a build either as an indicatif
//! progress bar, as plain `"NN.N% message"` lines, or only through tracing.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use crate::compositor::StatusUpdate;

/// Resolution of the bar: tenths of a percent
const BAR_LENGTH: u64 = 1000;

/// Trait for progress UI implementations
pub trait ProgressUI: Send + Sync {
    /// Show a status update
    fn update(&self, update: &StatusUpdate);

    /// Finish the display after a successful build
    fn finish(&self, message: &str);

    /// Finish the display after a failed build
    fn abandon(&self, message: &str);
}

/// Indicatif-based progress UI implementation
pub struct IndicatifProgressUI {
    bar: ProgressBar,
    start_time: Instant,
}

impl IndicatifProgressUI {
    /// Create a new indicatif progress UI
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_LENGTH);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] \
                     {percent:>3}% {msg}",
                )
                .expect("Valid template")
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar, start_time: Instant::now() }
    }

    /// Create a hidden bar, used when nothing should be drawn
    pub fn hidden() -> Self {
        Self { bar: ProgressBar::hidden(), start_time: Instant::now() }
    }

    /// Current bar position in tenths of a percent
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for IndicatifProgressUI {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressUI for IndicatifProgressUI {
    fn update(&self, update: &StatusUpdate) {
        let position = (update.progress.clamp(0.0, 100.0) * 10.0).round() as u64;
        self.bar.set_position(position);

        // Multi-line narration only shows its first line in the bar
        let message = update.message.lines().next().unwrap_or_default();
        self.bar.set_message(message.to_string());
    }

    fn finish(&self, message: &str) {
        let elapsed = self.start_time.elapsed();
        self.bar.finish_with_message(format!("{message} ({elapsed:.1?})"));
    }

    fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(format!("✗ {message}"));
    }
}

/// Prints one `"NN.N% message"` line per update
pub struct LineProgressUI;

impl ProgressUI for LineProgressUI {
    fn update(&self, update: &StatusUpdate) {
        println!("{}", format_status_line(update));
    }

    fn finish(&self, message: &str) {
        println!("{message}");
    }

    fn abandon(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// No-op progress UI for when visual progress is not needed
pub struct NoOpProgressUI;

impl ProgressUI for NoOpProgressUI {
    fn update(&self, update: &StatusUpdate) {
        info!("{:.1}% {}", update.progress, update.message);
    }

    fn finish(&self, message: &str) {
        info!("{}", message);
    }

    fn abandon(&self, message: &str) {
        error!("{}", message);
    }
}

/// Text of a status line
pub fn format_status_line(update: &StatusUpdate) -> String {
    format!("{:.1}% {}", update.progress, update.message)
}

/// Progress UI factory
pub struct ProgressUIFactory;

impl ProgressUIFactory {
    /// Bar on an interactive terminal, plain lines otherwise
    pub fn create(interactive: bool) -> Box<dyn ProgressUI> {
        if interactive && std::io::stdout().is_terminal() {
            Box::new(IndicatifProgressUI::new())
        } else {
            Box::new(LineProgressUI)
        }
    }

    /// Create a no-op progress UI
    pub fn create_noop() -> Box<dyn ProgressUI> {
        Box::new(NoOpProgressUI)
    }
}

/// Show every update from `updates` until the sender side is dropped
pub async fn render_updates(mut updates: UnboundedReceiver<StatusUpdate>, ui: &dyn ProgressUI) {
    while let Some(update) = updates.recv().await {
        ui.update(&update);
    }
}
