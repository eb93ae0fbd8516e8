//! The `align` and `toc` subcommands.

use clap::Args;

use super::AlignInputOpts;
use crate::{
    async_utils::io::{write_json, write_text},
    prelude::*,
};

/// Align command line arguments.
#[derive(Debug, Args)]
pub struct AlignOpts {
    #[clap(flatten)]
    pub input: AlignInputOpts,

    /// Include the predicted text in each labeled position.
    #[clap(long)]
    pub include_text: bool,

    /// Where to write the aligned positions as JSON. Defaults to stdout.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `align` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_align(opts: &AlignOpts) -> Result<()> {
    let config = opts.input.load_config().await?;
    let aligned = opts.input.load_aligned(&config, opts.include_text).await?;
    let matched = aligned
        .pages()
        .iter()
        .map(|page| page.positions.len())
        .sum::<usize>();
    info!(
        pages = aligned.pages().len(),
        positions = matched,
        "Aligned predictions"
    );
    write_json(opts.output_path.as_deref(), aligned.pages()).await
}

/// TOC command line arguments.
#[derive(Debug, Args)]
pub struct TocOpts {
    #[clap(flatten)]
    pub input: AlignInputOpts,

    /// The file name to show at the top of the summary.
    #[clap(long)]
    pub filename: String,

    /// Where to write the summary. Defaults to stdout.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `toc` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_toc(opts: &TocOpts) -> Result<()> {
    let config = opts.input.load_config().await?;
    let aligned = opts.input.load_aligned(&config, false).await?;
    let mut text = aligned.toc_text(&opts.filename);
    text.push('\n');
    write_text(opts.output_path.as_deref(), &text).await
}
