//! The `batch` subcommand: apply operations to many PDFs in parallel.
//!
//! Input is JSONL, one [`BatchInput`] per line. Output is JSONL, one
//! [`BatchOutput`] per input, in input order. A document that fails is
//! reported in its output record and does not stop the batch, but if too
//! many fail, the command as a whole fails after writing every record.

use std::sync::{Arc, Mutex};

use clap::Args;
use futures::{FutureExt as _, StreamExt as _};
use schemars::JsonSchema;

use super::{
    AlignInputOpts, StreamOpts,
    annotate::{Operation, PdfJob},
};
use crate::{
    annotate::AnnotationSummary,
    async_utils::io::{count_jsonl_records, read_jsonl, write_jsonl},
    config::Config,
    predictions::OffsetMode,
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// One document to process.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchInput {
    /// A unique ID, copied to the output record.
    pub id: Value,

    /// What to do to the PDF.
    pub operation: Operation,

    /// The source PDF.
    pub pdf: PathBuf,

    /// OCR result for the PDF. Required unless `positions` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<PathBuf>,

    /// Predictions for the PDF. Required unless `positions` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<PathBuf>,

    /// Previously aligned positions, used instead of `ocr` and `predictions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<PathBuf>,

    /// Where to write the edited PDF.
    pub output: PathBuf,
}

/// Did we process a document?
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Ok,
    Failed,
}

/// The result of processing one [`BatchInput`].
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct BatchOutput {
    /// The ID from the input record, or `null` if the input line could not be
    /// parsed.
    pub id: Value,

    pub status: BatchStatus,

    /// Why processing failed, outermost context first.
    pub errors: Vec<String>,

    /// The PDF we wrote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// How many pages had at least one marked region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,

    /// How many regions were marked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<usize>,
}

impl BatchOutput {
    fn succeeded(id: Value, output: PathBuf, summary: AnnotationSummary) -> Self {
        Self {
            id,
            status: BatchStatus::Ok,
            errors: vec![],
            output: Some(output),
            pages: Some(summary.pages),
            regions: Some(summary.regions),
        }
    }

    fn failed(id: Value, err: &anyhow::Error) -> Self {
        Self {
            id,
            status: BatchStatus::Failed,
            errors: err.chain().map(|cause| cause.to_string()).collect(),
            output: None,
            pages: None,
            regions: None,
        }
    }
}

/// Batch command line arguments.
#[derive(Debug, Args)]
pub struct BatchOpts {
    /// JSONL file with one record per document. Defaults to stdin.
    #[clap(value_name = "INPUT")]
    pub input_path: Option<PathBuf>,

    /// Where to write JSONL status records. Defaults to stdout.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// Configuration file (TOML or JSON) with colors and fill rules.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Which text prediction offsets point into. Defaults to `document`.
    #[clap(long, value_enum)]
    pub offsets: Option<OffsetMode>,

    /// Insert a table of contents page into highlighted PDFs.
    #[clap(long)]
    pub toc: bool,

    /// Append a color legend page to highlighted PDFs.
    #[clap(long)]
    pub legend: bool,

    /// Fill redactions with white instead of black.
    #[clap(long)]
    pub white: bool,

    /// Seed for fake replacement data.
    #[clap(long)]
    pub seed: Option<u64>,

    #[clap(flatten)]
    pub stream_opts: StreamOpts,
}

/// Settings shared by every record in a batch.
struct BatchSettings {
    config: Config,
    job: PdfJob,
    offsets: Option<OffsetMode>,
}

/// The `batch` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_batch(ui: Ui, opts: &BatchOpts) -> Result<()> {
    let config = Config::load(opts.config.as_deref()).await?;
    let mut job = PdfJob::from_config(Operation::Highlight, &config);
    job.toc = opts.toc;
    job.legend = opts.legend;
    job.redact.fill = config.redact_fill(opts.white);
    job.seed = opts.seed;
    let settings = Arc::new(BatchSettings {
        config,
        job,
        offsets: opts.offsets,
    });

    let size_hint = match &opts.input_path {
        Some(path) => count_jsonl_records(&ui, path).await?,
        None => (0, None),
    };
    let size_hint = opts.stream_opts.apply_size_hint(size_hint);
    let input = read_jsonl::<BatchInput>(opts.input_path.as_deref()).await?;
    let input = opts.stream_opts.apply_stream_input_opts(input);

    let pb = ui.new_from_size_hint(
        &ProgressConfig {
            emoji: "📄",
            msg: "Processing PDFs",
            done_msg: "Processed PDFs",
        },
        size_hint,
    );

    let counters = Arc::new(Mutex::new(BatchCounters::default()));
    let outputs = input
        .map(move |input| {
            let settings = settings.clone();
            async move {
                match input {
                    Ok(input) => process_record(input, &settings).await,
                    Err(err) => {
                        warn!("Could not read batch record: {:#}", err);
                        BatchOutput::failed(Value::Null, &err)
                    }
                }
            }
            .boxed()
        })
        .buffered(opts.stream_opts.job_count.max(1));
    let recorder = counters.clone();
    let progress = pb.clone();
    let outputs = outputs
        .map(move |output| {
            progress.inc(1);
            recorder.lock().expect("lock poisoned").record(&output);
            serde_json::to_value(&output).context("failed to serialize batch output")
        })
        .boxed();
    write_jsonl(opts.output_path.as_deref(), outputs).await?;
    pb.finish_using_style();

    let counters = counters.lock().expect("lock poisoned").to_owned();
    counters.finish(&ui, &opts.stream_opts)
}

/// Process a single record, turning any error into a failed output.
#[instrument(level = "debug", skip_all, fields(id = %input.id))]
async fn process_record(input: BatchInput, settings: &BatchSettings) -> BatchOutput {
    let id = input.id.clone();
    let output = input.output.clone();
    match run_record(input, settings).await {
        Ok(summary) => {
            debug!(?summary, "Processed batch record");
            BatchOutput::succeeded(id, output, summary)
        }
        Err(err) => {
            warn!(%id, "Batch record failed: {:#}", err);
            BatchOutput::failed(id, &err)
        }
    }
}

async fn run_record(input: BatchInput, settings: &BatchSettings) -> Result<AnnotationSummary> {
    let source = AlignInputOpts {
        ocr: input.ocr,
        predictions: input.predictions,
        positions: input.positions,
        offsets: settings.offsets,
        config: None,
    };
    let aligned = source.load_aligned(&settings.config, false).await?;
    let mut job = settings.job.clone();
    job.operation = input.operation;
    job.run(aligned, &input.pdf, &input.output).await
}

/// Running totals for a batch.
#[derive(Clone, Debug, Default, PartialEq)]
struct BatchCounters {
    total: usize,
    failures: usize,
    regions: usize,
}

impl BatchCounters {
    fn record(&mut self, output: &BatchOutput) {
        self.total += 1;
        if output.status == BatchStatus::Failed {
            self.failures += 1;
        }
        self.regions += output.regions.unwrap_or(0);
    }

    fn failure_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.failures as f32 / self.total as f32
        }
    }

    /// Report totals, and fail if too many documents failed.
    fn finish(&self, ui: &Ui, stream_opts: &StreamOpts) -> Result<()> {
        let failure_rate = self.failure_rate();
        if failure_rate > stream_opts.allowed_failure_rate {
            return Err(anyhow!(
                "{}/{} ({:.2}%) of documents failed, but only {:.2}% were allowed",
                self.failures,
                self.total,
                failure_rate * 100.0,
                stream_opts.allowed_failure_rate * 100.0
            ));
        }
        if self.failures > 0 {
            ui.display_message(
                "⚠️",
                &format!(
                    "{}/{} documents failed (within the allowed failure rate)",
                    self.failures, self.total
                ),
            );
        }
        ui.display_message(
            "✅",
            &format!(
                "Processed {} documents, marking {} regions",
                self.total - self.failures,
                self.regions
            ),
        );
        Ok(())
    }
}
