//! OCR results, as produced by the document extraction service.
//!
//! The raw result is a JSON array with one record per page. Each record holds
//! the page metadata (in a one-element `pages` array), the page's tokens, and
//! optional block and character data. We only read this data; nothing here
//! ever mutates it.

use std::{fmt, str::FromStr};

use schemars::JsonSchema;

use crate::{errors::HighlightError, predictions::OffsetMode, prelude::*};

/// A half-open range of character offsets.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
pub struct Offset {
    /// The first character.
    pub start: usize,
    /// One past the last character.
    pub end: usize,
}

/// A bounding box in page raster coordinates (usually pixels at the DPI used
/// for OCR), with the origin at the top left.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct BoundingBox {
    #[serde(rename = "bbLeft")]
    pub left: f64,
    #[serde(rename = "bbTop")]
    pub top: f64,
    #[serde(rename = "bbRight")]
    pub right: f64,
    #[serde(rename = "bbBot")]
    pub bottom: f64,
}

impl BoundingBox {
    /// The smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// A single OCR token (usually a word).
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Token {
    /// The recognized text.
    pub text: String,

    /// Offsets within the token's block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_offset: Option<Offset>,

    /// Offsets within the page's text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_offset: Option<Offset>,

    /// Offsets within the full document text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_offset: Option<Offset>,

    /// Where the token appears on the page.
    pub position: BoundingBox,

    /// The page this token appears on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_num: Option<usize>,
}

impl Token {
    /// The offsets used to match predictions in `mode`, if present.
    pub fn offset(&self, mode: OffsetMode) -> Option<Offset> {
        match mode {
            OffsetMode::PageLocal => self.page_offset,
            OffsetMode::DocumentGlobal => self.doc_offset,
        }
    }
}

/// The pixel size of the rasterized page used for OCR.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Page-level metadata and text.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct PageInfo {
    /// The 0-based page number.
    pub page_num: usize,

    /// The size of the page image that was OCRed.
    pub size: PageSize,

    /// The text of the page.
    #[serde(default)]
    pub text: String,

    /// Anything else the OCR service told us about the page.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A block of text, such as a paragraph or a table cell.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Block {
    /// The text of the block.
    #[serde(default)]
    pub text: String,

    /// Where the block appears on the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<BoundingBox>,
}

/// A single OCRed character.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct OcrChar {
    #[serde(default)]
    pub text: String,

    /// OCR confidence on a 0-100 scale. Older OCR results don't include this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// The OCR output for a single page.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct OcrPage {
    /// Page metadata. The OCR service wraps this in a one-element array.
    pub pages: Vec<PageInfo>,

    /// Tokens, in reading order.
    #[serde(default)]
    pub tokens: Vec<Token>,

    /// Text blocks, in reading order.
    #[serde(default)]
    pub blocks: Vec<Block>,

    /// Individual characters.
    #[serde(default)]
    pub chars: Vec<OcrChar>,
}

impl OcrPage {
    /// Our page metadata. [`OcrDocument::new`] guarantees that this exists.
    pub fn info(&self) -> &PageInfo {
        &self.pages[0]
    }

    /// The offsets of each token in `mode`, in token order.
    pub fn token_offsets(&self, mode: OffsetMode) -> Result<Vec<Offset>, HighlightError> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(idx, token)| {
                token.offset(mode).ok_or_else(|| {
                    HighlightError::AlignmentInput(format!(
                        "token {} ({:?}) on page {} has no {}",
                        idx,
                        token.text,
                        self.info().page_num,
                        mode.offset_field(),
                    ))
                })
            })
            .collect()
    }
}

/// How to aggregate character confidences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfidenceMetric {
    Mean,
    Median,
}

impl fmt::Display for ConfidenceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceMetric::Mean => write!(f, "mean"),
            ConfidenceMetric::Median => write!(f, "median"),
        }
    }
}

impl FromStr for ConfidenceMetric {
    type Err = HighlightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(ConfidenceMetric::Mean),
            "median" => Ok(ConfidenceMetric::Median),
            _ => Err(HighlightError::UnsupportedMetric(s.to_owned())),
        }
    }
}

/// Read-only access to a complete OCR result.
#[derive(Clone, Debug)]
pub struct OcrDocument {
    pages: Vec<OcrPage>,
}

impl OcrDocument {
    /// Wrap a raw OCR result, checking that every page has metadata.
    pub fn new(pages: Vec<OcrPage>) -> Result<Self, HighlightError> {
        for (idx, page) in pages.iter().enumerate() {
            if page.pages.is_empty() {
                return Err(HighlightError::AlignmentInput(format!(
                    "OCR record {} has no page metadata",
                    idx
                )));
            }
        }
        Ok(Self { pages })
    }

    /// Load an OCR result from a JSON file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let pages = crate::async_utils::io::read_json_or_toml::<Vec<OcrPage>>(path).await?;
        Self::new(pages).with_context(|| format!("invalid OCR result in {:?}", path.display()))
    }

    /// The raw page records.
    pub fn pages(&self) -> &[OcrPage] {
        &self.pages
    }

    /// The full document text, with pages separated by newlines.
    pub fn full_text(&self) -> String {
        self.page_text().join("\n")
    }

    /// The text of each page.
    pub fn page_text(&self) -> Vec<String> {
        self.pages.iter().map(|p| p.info().text.clone()).collect()
    }

    /// Page metadata for each page.
    pub fn page_results(&self) -> Vec<&PageInfo> {
        self.pages.iter().map(|p| p.info()).collect()
    }

    /// The text of every block in the document.
    pub fn block_text(&self) -> Vec<String> {
        self.pages
            .iter()
            .flat_map(|p| p.blocks.iter().map(|b| b.text.clone()))
            .collect()
    }

    /// Aggregate character-level OCR confidence for the whole document.
    pub fn ocr_confidence(&self, metric: ConfidenceMetric) -> Result<f64, HighlightError> {
        let mut confidences = self
            .pages
            .iter()
            .flat_map(|p| p.chars.iter().filter_map(|c| c.confidence))
            .collect::<Vec<_>>();
        if confidences.is_empty() {
            return Err(HighlightError::UnsupportedData(
                "no character confidences found; this OCR result predates confidence reporting"
                    .to_owned(),
            ));
        }
        match metric {
            ConfidenceMetric::Mean => {
                Ok(confidences.iter().sum::<f64>() / confidences.len() as f64)
            }
            ConfidenceMetric::Median => {
                confidences.sort_by(|a, b| a.total_cmp(b));
                let mid = confidences.len() / 2;
                if confidences.len() % 2 == 0 {
                    Ok((confidences[mid - 1] + confidences[mid]) / 2.0)
                } else {
                    Ok(confidences[mid])
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A single-page OCR result for the text "Amazon Web Services, Inc.".
    pub(crate) fn sample_ocr() -> Vec<OcrPage> {
        let token = |text: &str, start: usize, end: usize, left: f64, right: f64| {
            json!({
                "text": text,
                "page_num": 0,
                "block_offset": { "start": start - 125, "end": end - 125 },
                "page_offset": { "start": start, "end": end },
                "doc_offset": { "start": start, "end": end },
                "position": { "bbTop": 282, "bbBot": 342, "bbLeft": left, "bbRight": right },
            })
        };
        serde_json::from_value(json!([{
            "pages": [{ "page_num": 0, "size": { "height": 3300, "width": 2550 } }],
            "tokens": [
                token("Amazon", 125, 131, 1070.0, 1310.0),
                token("Web", 132, 135, 1332.0, 1463.0),
                token("Services,", 136, 145, 1486.0, 1752.0),
                token("Inc.", 146, 150, 1781.0, 1878.0),
            ],
        }]))
        .unwrap()
    }

    fn two_page_ocr(with_confidence: bool) -> OcrDocument {
        let chars = |confidences: &[f64]| {
            confidences
                .iter()
                .map(|c| {
                    if with_confidence {
                        json!({ "text": "x", "confidence": c })
                    } else {
                        json!({ "text": "x" })
                    }
                })
                .collect::<Vec<_>>()
        };
        let pages: Vec<OcrPage> = serde_json::from_value(json!([
            {
                "pages": [{
                    "page_num": 0,
                    "size": { "width": 2550, "height": 3300 },
                    "text": "Invoice\nAmazon Web Services",
                    "image": "page0.png",
                }],
                "blocks": [{ "text": "Invoice" }, { "text": "Amazon Web Services" }],
                "chars": chars(&[90.0, 80.0, 100.0]),
            },
            {
                "pages": [{
                    "page_num": 1,
                    "size": { "width": 2550, "height": 3300 },
                    "text": "Total due: $12.00",
                }],
                "blocks": [{ "text": "Total due: $12.00" }],
                "chars": chars(&[50.0]),
            },
        ]))
        .unwrap();
        OcrDocument::new(pages).unwrap()
    }

    #[test]
    fn text_accessors_work() {
        let ocr = two_page_ocr(true);
        let full_text = ocr.full_text();
        let page_text = ocr.page_text();
        assert_eq!(page_text.len(), 2);
        assert_eq!(full_text, "Invoice\nAmazon Web Services\nTotal due: $12.00");
        assert!(full_text.contains(&page_text[0]) && full_text.contains(&page_text[1]));

        let block_text = ocr.block_text();
        assert_eq!(block_text.len(), 3);
        assert!(page_text[0].contains(&block_text[0]));
        assert!(page_text[1].contains(&block_text[2]));

        let page_results = ocr.page_results();
        assert_eq!(page_results.len(), 2);
        assert_eq!(page_results[1].page_num, 1);
        assert_eq!(page_results[0].extra["image"], json!("page0.png"));
    }

    #[test]
    fn accessors_are_idempotent() {
        let ocr = two_page_ocr(true);
        assert_eq!(ocr.full_text(), ocr.full_text());
        assert_eq!(ocr.block_text(), ocr.block_text());
    }

    #[test]
    fn confidence_mean_and_median() {
        let ocr = two_page_ocr(true);
        let mean = ocr.ocr_confidence(ConfidenceMetric::Mean).unwrap();
        assert!((mean - 80.0).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&mean));
        let median = ocr.ocr_confidence(ConfidenceMetric::Median).unwrap();
        assert!((median - 85.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_requires_confidence_data() {
        let ocr = two_page_ocr(false);
        let err = ocr.ocr_confidence(ConfidenceMetric::Mean).unwrap_err();
        assert!(matches!(err, HighlightError::UnsupportedData(_)));
    }

    #[test]
    fn confidence_metric_parsing() {
        assert_eq!("mean".parse::<ConfidenceMetric>(), Ok(ConfidenceMetric::Mean));
        assert_eq!(
            "median".parse::<ConfidenceMetric>(),
            Ok(ConfidenceMetric::Median)
        );
        assert_eq!(
            "mode".parse::<ConfidenceMetric>(),
            Err(HighlightError::UnsupportedMetric("mode".to_owned()))
        );
    }

    #[test]
    fn pages_without_metadata_are_rejected() {
        let pages: Vec<OcrPage> =
            serde_json::from_value(json!([{ "pages": [], "tokens": [] }])).unwrap();
        assert!(matches!(
            OcrDocument::new(pages),
            Err(HighlightError::AlignmentInput(_))
        ));
    }

    #[test]
    fn token_offsets_report_missing_fields() {
        let mut pages = sample_ocr();
        pages[0].tokens[2].doc_offset = None;
        let err = pages[0]
            .token_offsets(OffsetMode::DocumentGlobal)
            .unwrap_err();
        assert!(err.to_string().contains("Services,"));
        assert_eq!(pages[0].token_offsets(OffsetMode::PageLocal).unwrap().len(), 4);
    }
}
