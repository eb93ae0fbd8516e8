use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod align;
mod annotate;
mod async_utils;
mod cmd;
mod color;
mod config;
mod errors;
mod fill;
mod geometry;
mod ocr;
mod pdf;
mod predictions;
mod prelude;
mod ui;

/// Map model predictions onto OCR token boxes, then highlight or redact them
/// in PDFs.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Inputs:
  OCR results are JSON lists of page records, one per page, with tokens
  carrying `page_offset` and/or `doc_offset` character ranges. Predictions
  are JSON lists of `{ label, start, end, text }`, or one such list per page
  with `--offsets page`. Run `schema <TYPE>` for the exact formats.

Environment Variables:
  - RUST_LOG (optional): Logging filter, for example `debug`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Match predictions to OCR token boxes and write the positions as JSON.
    Align(cmd::align::AlignOpts),
    /// Highlight predictions in a copy of a PDF.
    Highlight(cmd::annotate::HighlightOpts),
    /// Black out predictions in a copy of a PDF.
    Redact(cmd::annotate::RedactOpts),
    /// Redact predictions and draw fake data of the same kind over them.
    Replace(cmd::annotate::ReplaceOpts),
    /// Summarize which labels were found on which pages.
    Toc(cmd::align::TocOpts),
    /// Extract text from an OCR result.
    Text(cmd::text::TextOpts),
    /// Compute the overall OCR confidence of a document.
    Confidence(cmd::text::ConfidenceOpts),
    /// Process many PDFs listed in a JSONL file.
    Batch(cmd::batch::BatchOpts),
    /// Print schemas for input and output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Align(opts) => opts.output_path.is_none(),
            Cmd::Highlight(_) | Cmd::Redact(_) | Cmd::Replace(_) => false,
            Cmd::Toc(opts) => opts.output_path.is_none(),
            Cmd::Text(opts) => opts.output_path.is_none(),
            Cmd::Confidence(_) => true,
            Cmd::Batch(opts) => opts.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive = Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Progress bars would get mixed up with our output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Align(opts) => cmd::align::cmd_align(opts).await,
        Cmd::Highlight(opts) => cmd::annotate::cmd_highlight(ui, opts).await,
        Cmd::Redact(opts) => cmd::annotate::cmd_redact(ui, opts).await,
        Cmd::Replace(opts) => cmd::annotate::cmd_replace(ui, opts).await,
        Cmd::Toc(opts) => cmd::align::cmd_toc(opts).await,
        Cmd::Text(opts) => cmd::text::cmd_text(opts).await,
        Cmd::Confidence(opts) => cmd::text::cmd_confidence(opts).await,
        Cmd::Batch(opts) => cmd::batch::cmd_batch(ui, opts).await,
        Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await,
    }
}
