// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for user interaction, parsed with clap.
// The only runtime input is the corpus directory; every other
// setting is a TrainConfig default.
//
//   quickdraw-trainer [DATA_DIR]
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::application::train_use_case::{TrainConfig, TrainUseCase};
use crate::error::PipelineError;

#[derive(Parser, Debug)]
#[command(
    name = "quickdraw-trainer",
    version = "0.1.0",
    about = "Train a CNN drawing classifier on a directory of QuickDraw .ndjson files."
)]
pub struct Cli {
    /// Directory containing the .ndjson corpus [default: ~/data/quickdraw]
    pub data_dir: Option<PathBuf>,
}

impl Cli {
    /// Build the run configuration and hand off to Layer 2.
    pub fn run(self) -> Result<()> {
        let use_case = TrainUseCase::new(self.into_config());
        tracing::info!("Starting training on corpus in: {}", use_case.data_dir().display());
        if let Err(err) = use_case.execute() {
            if let Some(cause) = err.downcast_ref::<PipelineError>() {
                tracing::error!("Run aborted ({:?}): {cause}", cause.kind());
            }
            return Err(err);
        }

        println!("Training complete. Model files saved.");
        Ok(())
    }

    fn into_config(self) -> TrainConfig {
        match self.data_dir {
            Some(dir) => TrainConfig::default().with_data_dir(dir),
            None      => TrainConfig::default(),
        }
    }
}
