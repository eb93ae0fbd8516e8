//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;

use super::batch::{BatchInput, BatchOutput};
use crate::{
    align::PageResult, async_utils::io::write_json, config::Config, ocr::OcrPage,
    predictions::PredictionInput, prelude::*,
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// One page of an OCR result. OCR files hold a list of these.
    OcrPage,
    /// Model predictions.
    PredictionInput,
    /// Aligned positions for one page, as written by `align`.
    PageResult,
    /// The `--config` file.
    Config,
    /// One line of `batch` input.
    BatchInput,
    /// One line of `batch` output.
    BatchOutput,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    let schema = match schema_opts.schema_type {
        SchemaType::OcrPage => schema_for!(OcrPage),
        SchemaType::PredictionInput => schema_for!(PredictionInput),
        SchemaType::PageResult => schema_for!(PageResult),
        SchemaType::Config => schema_for!(Config),
        SchemaType::BatchInput => schema_for!(BatchInput),
        SchemaType::BatchOutput => schema_for!(BatchOutput),
    };
    write_json(schema_opts.output_path.as_deref(), &schema)
        .await
        .context("failed to write schema")
}
