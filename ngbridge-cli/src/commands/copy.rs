//! Run a long native operation with a progress bar.
//!
//! Ctrl+C cancels the operation through its token; `--stop-at` refuses
//! progress from the callback itself once the given fraction is reached.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use ngbridge::callback::{CallbackRegistry, ProgressCallback};
use ngbridge::native::{AsyncOp, Handle, Operation, SimulatedEngine};
use ngbridge::StatusCode;

use crate::error::CliError;

/// Kind of operation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OpKind {
    #[default]
    Copy,
    Backup,
    UrlFetch,
    BuildOverviews,
}

#[derive(Debug, Args)]
pub struct CopyArgs {
    /// Operation to run
    #[arg(long, value_enum, default_value_t = OpKind::Copy)]
    pub kind: OpKind,

    /// Source path or URL
    #[arg(long, default_value = "ngc://store/roads")]
    pub source: String,

    /// Destination path
    #[arg(long, default_value = "ngc://store/roads_copy")]
    pub destination: String,

    /// Number of progress steps the engine reports
    #[arg(long, default_value_t = 20)]
    pub steps: usize,

    /// Delay between progress steps in milliseconds
    #[arg(long, default_value_t = 100)]
    pub step_ms: u64,

    /// Refuse further progress once this fraction (0.0-1.0) is reached
    #[arg(long)]
    pub stop_at: Option<f64>,

    /// Make the engine fail at this step
    #[arg(long)]
    pub fail_at: Option<usize>,
}

impl CopyArgs {
    fn op(&self) -> AsyncOp {
        match self.kind {
            OpKind::Copy => AsyncOp::copy(self.source.clone(), self.destination.clone()),
            OpKind::Backup => AsyncOp::backup(self.source.clone(), self.destination.clone()),
            OpKind::UrlFetch => AsyncOp::url_fetch(self.source.clone(), self.destination.clone()),
            OpKind::BuildOverviews => AsyncOp::BuildOverviews {
                raster: Handle::new(1),
            },
        }
    }
}

pub fn run(args: CopyArgs) -> Result<(), CliError> {
    if let Some(stop_at) = args.stop_at {
        if !(0.0..=1.0).contains(&stop_at) {
            return Err(CliError::InvalidArgument(format!(
                "--stop-at must be between 0.0 and 1.0, got {}",
                stop_at
            )));
        }
    }

    let registry = Arc::new(CallbackRegistry::new());
    let mut engine = SimulatedEngine::new(Arc::clone(&registry))
        .with_steps(args.steps)
        .with_step_delay(Duration::from_millis(args.step_ms));
    if let Some(step) = args.fail_at {
        engine = engine.failing_at(step, args.op().failure_status());
    }

    let token = CancellationToken::new();
    let signal_token = token.clone();
    ctrlc::set_handler(move || {
        signal_token.cancel();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let bar = ProgressBar::new(1000);
    let style = ProgressStyle::with_template("{spinner} [{bar:40}] {percent:>3}% {msg}")
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?
        .progress_chars("=> ");
    bar.set_style(style);

    let stop_at = args.stop_at;
    let progress_bar = bar.clone();
    let progress: ProgressCallback = Arc::new(move |status, fraction, message| {
        progress_bar.set_position((fraction * 1000.0) as u64);
        progress_bar.set_message(format!("{} {}", status, message));
        match stop_at {
            Some(limit) if status == StatusCode::InProcess => fraction < limit,
            _ => true,
        }
    });

    let op = args.op();
    info!(op = %op, steps = args.steps, "Starting operation");
    let outcome = Operation::new(op)
        .with_progress(progress)
        .with_cancellation(token)
        .run(&engine, &registry);

    if outcome.is_success() {
        bar.finish_with_message(outcome.status.to_string());
    } else {
        bar.abandon_with_message(outcome.status.to_string());
    }
    println!(
        "{}: {} (result {})",
        outcome.op, outcome.status, outcome.result
    );
    if let Some(message) = &outcome.message {
        println!("  {}", message);
    }

    outcome.into_result().map(|_| ()).map_err(CliError::from)
}
