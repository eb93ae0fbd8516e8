//! I/O utilities.
//!
//! This module reads JSON and TOML documents and JSONL streams, and writes
//! JSON, JSONL and plain text. Inputs can come from a file or standard input,
//! and outputs can go to a file or standard output.

use std::sync::Arc;

use futures::{TryStreamExt as _, pin_mut, stream::StreamExt as _};
use serde::de::DeserializeOwned;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt as _, AsyncRead, AsyncWrite, AsyncWriteExt as _, BufReader, BufWriter},
};
use tokio_stream::wrappers::LinesStream;

use super::BoxedStream;
use crate::{
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// Does this file look like JSON?
///
/// We trust `.json`, `.jsonl` and `.toml` extensions, and otherwise look at
/// the first non-blank character.
fn is_json_like(path: &Path, data: &str) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") | Some("jsonl") => true,
        Some("toml") => false,
        _ => matches!(data.trim_start().chars().next(), Some('{') | Some('[')),
    }
}

/// Read TOML or JSON from a file.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    // Read all at once because our parsing libraries don't do async I/O.
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    if is_json_like(path, &data) {
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse JSON from file at path: {:?}", path))
    } else {
        toml::from_str(&data)
            .with_context(|| format!("Failed to parse TOML from file at path: {:?}", path))
    }
}

/// Open a file or standard input for reading.
async fn open_reader(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncRead + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("Failed to open file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdin())),
    }
}

/// Count the non-blank lines in a JSONL file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn count_jsonl_records(ui: &Ui, path: &Path) -> Result<(usize, Option<usize>)> {
    // Named pipes and the like can only be read once.
    if !path.is_file() {
        return Ok((0, None));
    }

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🧮",
        msg: "Counting input records",
        done_msg: "Counted input records",
    });
    let reader = BufReader::new(open_reader(Some(path)).await?);
    let count = LinesStream::new(reader.lines())
        .try_fold(0, |acc, line| async move {
            Ok(if line.trim().is_empty() { acc } else { acc + 1 })
        })
        .await
        .with_context(|| format!("Failed to read lines from {:?}", path))?;
    spinner.finish_with_message(format!("Found {count} records"));
    Ok((count, Some(count)))
}

/// Read JSONL records from a file or stdin. Blank lines are skipped.
pub async fn read_jsonl<T>(path: Option<&Path>) -> Result<BoxedStream<Result<T>>>
where
    T: DeserializeOwned + Send + 'static,
{
    let description = Arc::new(match path {
        Some(path) => path.display().to_string(),
        None => "stdin".to_owned(),
    });
    let reader = BufReader::new(open_reader(path).await?);
    let lines = LinesStream::new(reader.lines()).try_filter(|line| {
        let keep = !line.trim().is_empty();
        async move { keep }
    });
    Ok(Box::pin(lines.then(move |line| {
        let description = description.clone();
        async move {
            let line = line.with_context(|| format!("Failed to read from {}", description))?;
            serde_json::from_str::<T>(&line).with_context(|| {
                format!(
                    "Failed to parse JSON from line in {}: {:?}",
                    description, line
                )
            })
        }
    })))
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a single value as pretty-printed JSON.
pub async fn write_json<T>(path: Option<&Path>, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    json.push('\n');
    write_text(path, &json).await
}

/// Write plain text.
pub async fn write_text(path: Option<&Path>, text: &str) -> Result<()> {
    let mut writer = create_writer(path).await?;
    writer
        .write_all(text.as_bytes())
        .await
        .context("Failed to write output")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Write a stream of JSON values to either standard output or a file, one
/// per line.
pub async fn write_jsonl(path: Option<&Path>, stream: BoxedStream<Result<Value>>) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    pin_mut!(stream);
    while let Some(value) = stream.next().await {
        let value = value?;
        let json = serde_json::to_string(&value)
            .with_context(|| format!("Failed to serialize JSON from value: {:?}", value))?;
        writer
            .write_all(json.as_bytes())
            .await
            .context("Failed to write JSON to output")?;
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline to output")?;
    }
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}
