//! The `text` and `confidence` subcommands, which read from an OCR result
//! without touching predictions.

use clap::{Args, ValueEnum};

use crate::{
    async_utils::io::{write_json, write_text},
    ocr::{ConfidenceMetric, OcrDocument},
    prelude::*,
};

/// Which text to extract.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum TextKind {
    /// The whole document as plain text, pages separated by newlines.
    #[default]
    Full,
    /// A JSON list with the text of each page.
    Pages,
    /// A JSON list with the text of each block.
    Blocks,
    /// A JSON list with the metadata of each page.
    Results,
}

/// Text command line arguments.
#[derive(Debug, Args)]
pub struct TextOpts {
    /// OCR result: a JSON list of page records.
    #[clap(long)]
    pub ocr: PathBuf,

    /// What to extract.
    #[clap(long, value_enum, default_value_t)]
    pub kind: TextKind,

    /// Where to write the output. Defaults to stdout.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `text` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_text(opts: &TextOpts) -> Result<()> {
    let ocr = OcrDocument::from_path(&opts.ocr).await?;
    let out = opts.output_path.as_deref();
    match opts.kind {
        TextKind::Full => {
            let mut text = ocr.full_text();
            text.push('\n');
            write_text(out, &text).await
        }
        TextKind::Pages => write_json(out, &ocr.page_text()).await,
        TextKind::Blocks => write_json(out, &ocr.block_text()).await,
        TextKind::Results => write_json(out, &ocr.page_results()).await,
    }
}

/// Confidence command line arguments.
#[derive(Debug, Args)]
pub struct ConfidenceOpts {
    /// OCR result: a JSON list of page records.
    #[clap(long)]
    pub ocr: PathBuf,

    /// How to aggregate character confidences: `mean` or `median`.
    #[clap(long, default_value = "mean")]
    pub metric: ConfidenceMetric,
}

/// The `confidence` subcommand. Prints a number between 0 and 100.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_confidence(opts: &ConfidenceOpts) -> Result<()> {
    let ocr = OcrDocument::from_path(&opts.ocr).await?;
    let confidence = ocr
        .ocr_confidence(opts.metric)
        .with_context(|| format!("cannot compute OCR confidence for {:?}", opts.ocr))?;
    debug!(metric = %opts.metric, confidence, "Computed OCR confidence");
    write_text(None, &format!("{confidence:.2}\n")).await
}
