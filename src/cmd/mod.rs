//! Command-line entry points.

use clap::Args;
use futures::StreamExt as _;

use crate::{
    align::AlignOptions,
    annotate::AlignedDocument,
    async_utils::{BoxedStream, spawn_blocking_propagating_panics},
    config::Config,
    ocr::OcrDocument,
    predictions::{OffsetMode, PredictionInput},
    prelude::*,
};

pub mod align;
pub mod annotate;
pub mod batch;
pub mod schema;
pub mod text;

/// Common options for subcommands that process data streams.
#[derive(Debug, Clone, Args)]
pub struct StreamOpts {
    /// Limit processing to the first N records.
    #[clap(long)]
    pub take_first: Option<usize>,

    /// Max number of documents to process at a time.
    #[clap(short = 'j', long = "jobs", default_value = "8")]
    pub job_count: usize,

    /// What portion of inputs should we allow to fail? Specified as a
    /// number between 0.0 and 1.0.
    #[clap(long, default_value = "0.01")]
    pub allowed_failure_rate: f32,
}

impl StreamOpts {
    /// Apply any necessary stream opts to our input stream.
    pub fn apply_stream_input_opts<T>(&self, input: BoxedStream<T>) -> BoxedStream<T>
    where
        T: 'static,
    {
        if let Some(take_first) = self.take_first {
            input.take(take_first).boxed()
        } else {
            input
        }
    }

    /// Adjust an input size hint for `--take-first`.
    pub fn apply_size_hint(&self, (low, high): (usize, Option<usize>)) -> (usize, Option<usize>) {
        match self.take_first {
            Some(n) => (low.min(n), Some(high.map_or(n, |high| high.min(n)))),
            None => (low, high),
        }
    }
}

/// Where alignment results come from: either OCR plus predictions, or a
/// positions file written by `align`.
#[derive(Debug, Clone, Args)]
pub struct AlignInputOpts {
    /// OCR result: a JSON list of page records.
    #[clap(long, required_unless_present = "positions")]
    pub ocr: Option<PathBuf>,

    /// Model predictions: a JSON list of predictions, or one list per page.
    #[clap(long, requires = "ocr", required_unless_present = "positions")]
    pub predictions: Option<PathBuf>,

    /// Aligned positions written by the `align` subcommand, used instead of
    /// `--ocr` and `--predictions`.
    #[clap(long, conflicts_with_all = ["ocr", "predictions"])]
    pub positions: Option<PathBuf>,

    /// Which text prediction offsets point into. Defaults to `document`.
    #[clap(long, value_enum)]
    pub offsets: Option<OffsetMode>,

    /// Configuration file (TOML or JSON) with colors and fill rules.
    #[clap(long)]
    pub config: Option<PathBuf>,
}

impl AlignInputOpts {
    pub async fn load_config(&self) -> Result<Config> {
        Config::load(self.config.as_deref()).await
    }

    /// Load or compute the alignment results.
    pub async fn load_aligned(
        &self,
        config: &Config,
        include_text: bool,
    ) -> Result<AlignedDocument> {
        if let Some(positions) = &self.positions {
            return AlignedDocument::from_path(positions).await;
        }
        let (Some(ocr_path), Some(predictions_path)) = (&self.ocr, &self.predictions) else {
            return Err(anyhow!(
                "either --positions, or both --ocr and --predictions, must be given"
            ));
        };
        let options = AlignOptions {
            mode: config.offset_mode(self.offsets),
            include_text,
        };
        align_files(ocr_path, predictions_path, options).await
    }
}

/// Read OCR and predictions from disk and align them.
pub async fn align_files(
    ocr_path: &Path,
    predictions_path: &Path,
    options: AlignOptions,
) -> Result<AlignedDocument> {
    let ocr = OcrDocument::from_path(ocr_path).await?;
    let predictions = PredictionInput::from_path(predictions_path)
        .await
        .with_context(|| format!("invalid predictions in {:?}", predictions_path))?;
    spawn_blocking_propagating_panics(move || {
        AlignedDocument::align(&ocr, predictions, &options)
    })
    .await?
    .with_context(|| format!("could not align predictions with {:?}", ocr_path))
}
