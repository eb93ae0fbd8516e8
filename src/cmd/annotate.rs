//! The `highlight`, `redact` and `replace` subcommands.

use clap::{Args, ValueEnum};
use rand::{SeedableRng as _, rngs::StdRng};
use schemars::JsonSchema;

use super::AlignInputOpts;
use crate::{
    annotate::{AlignedDocument, AnnotationSummary, HighlightOptions, RedactOptions},
    async_utils::spawn_blocking_propagating_panics,
    color::{Color, ColorMap},
    config::Config,
    fill::FillRules,
    pdf::{self, PdfEditor as _},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// What to do to a PDF.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Highlight each prediction in its label's color.
    Highlight,
    /// Cover each prediction with a solid box and remove the text under it.
    Redact,
    /// Redact each prediction and draw fake data of the same kind over it.
    Replace,
}

impl Operation {
    fn verb(self) -> &'static str {
        match self {
            Operation::Highlight => "highlight",
            Operation::Redact => "redact",
            Operation::Replace => "redact and replace text in",
        }
    }
}

/// Everything needed to apply an [`Operation`] to one PDF.
#[derive(Clone, Debug)]
pub struct PdfJob {
    pub operation: Operation,
    pub colors: ColorMap,
    pub toc: bool,
    pub legend: bool,
    pub redact: RedactOptions,
    pub fill_rules: FillRules,
    /// Seed for fake data. Fresh randomness is used if absent.
    pub seed: Option<u64>,
}

impl PdfJob {
    /// A job using the settings in `config`.
    pub fn from_config(operation: Operation, config: &Config) -> Self {
        Self {
            operation,
            colors: config.color_map(None),
            toc: false,
            legend: false,
            redact: RedactOptions {
                fill: config.redact_fill(false),
            },
            fill_rules: config.fill_rules(),
            seed: None,
        }
    }

    /// Apply this job to `pdf_path`, writing the result to `output_path`.
    ///
    /// The PDF work runs on a blocking thread. The output is written
    /// atomically, so `output_path` may be the same as `pdf_path`.
    pub async fn run(
        self,
        aligned: AlignedDocument,
        pdf_path: &Path,
        output_path: &Path,
    ) -> Result<AnnotationSummary> {
        let context = format!("could not {} {:?}", self.operation.verb(), pdf_path);
        let pdf_path = pdf_path.to_owned();
        let output_path = output_path.to_owned();
        spawn_blocking_propagating_panics(move || -> Result<AnnotationSummary> {
            let mut editor = pdf::open(&pdf_path)?;
            let summary = match self.operation {
                Operation::Highlight => {
                    let options = HighlightOptions {
                        colors: self.colors,
                        toc_filename: self.toc.then(|| pdf_path.display().to_string()),
                        legend: self.legend,
                    };
                    aligned.highlight(&mut editor, &options)?
                }
                Operation::Redact => aligned.redact(&mut editor, &self.redact)?,
                Operation::Replace => {
                    let mut rng = match self.seed {
                        Some(seed) => StdRng::seed_from_u64(seed),
                        None => StdRng::from_os_rng(),
                    };
                    aligned.redact_and_replace(&mut editor, &self.fill_rules, &mut rng)?
                }
            };
            editor.save(&output_path)?;
            Ok(summary)
        })
        .await?
        .context(context)
    }
}

/// Options shared by every subcommand that writes a PDF.
#[derive(Debug, Args)]
pub struct PdfOpts {
    /// The source PDF.
    #[clap(value_name = "PDF")]
    pub pdf_path: PathBuf,

    #[clap(flatten)]
    pub input: AlignInputOpts,

    /// Where to write the edited PDF. May be the same as the source.
    #[clap(short = 'o', long = "out")]
    pub output_path: PathBuf,
}

/// Highlight command line arguments.
#[derive(Debug, Args)]
pub struct HighlightOpts {
    #[clap(flatten)]
    pub pdf: PdfOpts,

    /// Insert a page at the front listing the labels found on each page.
    #[clap(long)]
    pub toc: bool,

    /// Append a page showing which color goes with which label.
    #[clap(long)]
    pub legend: bool,

    /// Color for labels without a configured color.
    #[clap(long)]
    pub default_color: Option<Color>,
}

/// Redact command line arguments.
#[derive(Debug, Args)]
pub struct RedactOpts {
    #[clap(flatten)]
    pub pdf: PdfOpts,

    /// Fill redactions with white instead of black.
    #[clap(long)]
    pub white: bool,
}

/// Replace command line arguments.
#[derive(Debug, Args)]
pub struct ReplaceOpts {
    #[clap(flatten)]
    pub pdf: PdfOpts,

    /// Seed for the fake data generator, for reproducible output.
    #[clap(long)]
    pub seed: Option<u64>,
}

/// The `highlight` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_highlight(ui: Ui, opts: &HighlightOpts) -> Result<()> {
    let config = opts.pdf.input.load_config().await?;
    let mut job = PdfJob::from_config(Operation::Highlight, &config);
    job.colors = config.color_map(opts.default_color);
    job.toc = opts.toc;
    job.legend = opts.legend;
    debug!(default_color = %job.colors.default_color(), "Using highlight colors");
    run_pdf_command(ui, &opts.pdf, &config, job).await
}

/// The `redact` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_redact(ui: Ui, opts: &RedactOpts) -> Result<()> {
    let config = opts.pdf.input.load_config().await?;
    let mut job = PdfJob::from_config(Operation::Redact, &config);
    job.redact.fill = config.redact_fill(opts.white);
    run_pdf_command(ui, &opts.pdf, &config, job).await
}

/// The `replace` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_replace(ui: Ui, opts: &ReplaceOpts) -> Result<()> {
    let config = opts.pdf.input.load_config().await?;
    let mut job = PdfJob::from_config(Operation::Replace, &config);
    job.seed = opts.seed;
    if job.fill_rules.is_empty() {
        warn!("No fill rules configured; add a [fill_rules] table to your --config file");
    }
    run_pdf_command(ui, &opts.pdf, &config, job).await
}

async fn run_pdf_command(ui: Ui, opts: &PdfOpts, config: &Config, job: PdfJob) -> Result<()> {
    let aligned = opts.input.load_aligned(config, false).await?;
    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "📄",
        msg: "Editing PDF",
        done_msg: "Edited PDF",
    });
    let summary = job.run(aligned, &opts.pdf_path, &opts.output_path).await?;
    spinner.finish_using_style();
    ui.display_message(
        "✅",
        &format!(
            "Marked {} regions on {} pages, wrote {}",
            summary.regions,
            summary.pages,
            opts.output_path.display()
        ),
    );
    Ok(())
}
