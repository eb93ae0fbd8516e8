//! Aligning model predictions with OCR token positions.
//!
//! Predictions refer to text by character offsets. Tokens carry both
//! character offsets and bounding boxes. To find where a prediction appears
//! on the page, we collect the tokens inside its span and merge their boxes,
//! one box per visual line.

pub mod merge;
pub mod routing;

use std::collections::BTreeMap;

use schemars::JsonSchema;

use crate::{
    errors::HighlightError,
    ocr::{BoundingBox, OcrDocument, PageSize},
    predictions::{OffsetMode, Prediction, PredictionInput, sort_by_start},
    prelude::*,
};

use self::routing::{PageBatch, route_document_global, route_page_local};

/// The label attached to a position.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct PositionLabel {
    /// The prediction's label.
    pub name: String,

    /// The length of the predicted text, in characters. We keep the length
    /// instead of the text so that replacement text can be sized to match
    /// without carrying sensitive data around.
    pub text_len: usize,
}

/// One box covering a run of tokens on a single line, all matched to the same
/// prediction.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct PositionRecord {
    /// The box, in OCR raster coordinates.
    #[serde(flatten)]
    pub bbox: BoundingBox,

    /// The prediction's label. Alignment always sets this, but position files
    /// from elsewhere may not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<PositionLabel>,

    /// The full predicted text, only included on request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

/// Alignment output for one page.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct PageResult {
    /// The 0-based page number.
    pub page_num: usize,

    /// The size of the OCRed page image, used to rescale positions onto the
    /// PDF page.
    pub dimensions: PageSize,

    /// Matched positions, in token order.
    #[serde(default)]
    pub positions: Vec<PositionRecord>,

    /// How many predictions of each label matched on this page.
    #[serde(default)]
    pub labels: BTreeMap<String, usize>,
}

/// Options for [`collect_positions`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AlignOptions {
    /// Which offsets the predictions use.
    pub mode: OffsetMode,

    /// Include the full predicted text with each position.
    pub include_text: bool,
}

/// Find the positions of all predictions in a document.
///
/// Returns one [`PageResult`] per OCR page, in page order. If any page
/// fails, the whole call fails.
#[instrument(level = "debug", skip_all, fields(mode = ?options.mode))]
pub fn collect_positions(
    ocr: &OcrDocument,
    predictions: PredictionInput,
    options: &AlignOptions,
) -> Result<Vec<PageResult>, HighlightError> {
    let pages = ocr.pages();
    let results = match options.mode {
        OffsetMode::PageLocal => {
            let mut lists = predictions.into_page_predictions(pages.len())?;
            for list in &mut lists {
                prepare(list)?;
            }
            align_batches(route_page_local(pages, &lists)?, options)
        }
        OffsetMode::DocumentGlobal => {
            let mut list = predictions.into_document_predictions()?;
            prepare(&mut list)?;
            align_batches(route_document_global(pages, &list)?, options)
        }
    };
    debug!(
        pages = results.len(),
        positions = results.iter().map(|r| r.positions.len()).sum::<usize>(),
        "Aligned predictions"
    );
    Ok(results)
}

/// Validate and sort a prediction list.
fn prepare(predictions: &mut [Prediction]) -> Result<(), HighlightError> {
    for prediction in predictions.iter() {
        prediction.validate()?;
    }
    sort_by_start(predictions);
    Ok(())
}

fn align_batches(batches: Vec<PageBatch<'_>>, options: &AlignOptions) -> Vec<PageResult> {
    batches
        .iter()
        .map(|batch| {
            merge::match_page(
                batch.page,
                &batch.offsets,
                batch.predictions,
                options.include_text,
            )
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        ocr::{OcrPage, Offset, PageInfo, Token, tests::sample_ocr},
        predictions::tests::prediction,
    };

    pub(crate) fn bbox(left: f64, top: f64, right: f64, bottom: f64) -> BoundingBox {
        BoundingBox {
            left,
            top,
            right,
            bottom,
        }
    }

    /// A token with identical page and document offsets.
    pub(crate) fn token(text: &str, start: usize, end: usize, position: BoundingBox) -> Token {
        Token {
            text: text.to_owned(),
            block_offset: None,
            page_offset: Some(Offset { start, end }),
            doc_offset: Some(Offset { start, end }),
            position,
            page_num: None,
        }
    }

    pub(crate) fn page(page_num: usize, tokens: Vec<Token>) -> OcrPage {
        OcrPage {
            pages: vec![PageInfo {
                page_num,
                size: PageSize {
                    width: 2550.0,
                    height: 3300.0,
                },
                text: String::new(),
                extra: Default::default(),
            }],
            tokens,
            blocks: vec![],
            chars: vec![],
        }
    }

    fn vendor_prediction() -> PredictionInput {
        PredictionInput::Nested(vec![vec![prediction(
            "Vendor",
            125,
            150,
            "Amazon Web Services, Inc.",
        )]])
    }

    #[test]
    fn sample_vendor_prediction_aligns_to_one_box() {
        let ocr = OcrDocument::new(sample_ocr()).unwrap();
        let results =
            collect_positions(&ocr, vendor_prediction(), &AlignOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.labels.get("Vendor"), Some(&1));
        assert_eq!(result.positions.len(), 1);
        let position = &result.positions[0];
        assert_eq!(position.bbox.left, 1070.0);
        assert_eq!(position.bbox.right, 1878.0);
        let label = position.label.as_ref().unwrap();
        assert_eq!(label.name, "Vendor");
        assert_eq!(label.text_len, 25);
        assert!(position.full_text.is_none());
        assert_eq!(result.dimensions.width, 2550.0);
    }

    #[test]
    fn page_local_mode_uses_page_offsets() {
        let mut pages = sample_ocr();
        // Pretend this was page two of a document, so document offsets are
        // shifted but page offsets are not.
        for token in &mut pages[0].tokens {
            token.doc_offset = None;
        }
        let ocr = OcrDocument::new(pages).unwrap();
        let options = AlignOptions {
            mode: OffsetMode::PageLocal,
            include_text: true,
        };
        let results = collect_positions(&ocr, vendor_prediction(), &options).unwrap();
        assert_eq!(results[0].positions.len(), 1);
        assert_eq!(
            results[0].positions[0].full_text.as_deref(),
            Some("Amazon Web Services, Inc.")
        );

        // The document-global mode needs the offsets we removed.
        let err = collect_positions(&ocr, vendor_prediction(), &AlignOptions::default())
            .unwrap_err();
        assert!(matches!(err, HighlightError::AlignmentInput(_)));
    }

    #[test]
    fn labels_count_predictions_not_boxes() {
        let ocr = OcrDocument::new(vec![page(
            0,
            vec![
                token("123", 0, 3, bbox(100.0, 10.0, 150.0, 30.0)),
                token("Main", 4, 8, bbox(160.0, 10.0, 220.0, 30.0)),
                token("Springfield", 9, 20, bbox(100.0, 40.0, 250.0, 60.0)),
                token("Bob", 21, 24, bbox(100.0, 70.0, 150.0, 90.0)),
            ],
        )])
        .unwrap();
        let predictions = PredictionInput::Flat(vec![
            prediction("Address", 0, 20, "123 Main Springfield"),
            prediction("Name", 21, 24, "Bob"),
            prediction("Name", 500, 503, "Ann"),
        ]);
        let results =
            collect_positions(&ocr, predictions, &AlignOptions::default()).unwrap();
        let result = &results[0];
        assert_eq!(result.positions.len(), 3);
        assert_eq!(result.labels.get("Address"), Some(&1));
        // The unmatched "Ann" isn't counted.
        assert_eq!(result.labels.get("Name"), Some(&1));
        let labels = result
            .positions
            .iter()
            .map(|p| p.label.as_ref().unwrap().name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["Address", "Address", "Name"]);
    }

    #[test]
    fn unsorted_predictions_are_sorted_first() {
        let ocr = OcrDocument::new(vec![page(
            0,
            vec![
                token("a", 0, 1, bbox(0.0, 0.0, 10.0, 10.0)),
                token("b", 2, 3, bbox(20.0, 0.0, 30.0, 10.0)),
            ],
        )])
        .unwrap();
        let predictions =
            PredictionInput::Flat(vec![prediction("B", 2, 3, "b"), prediction("A", 0, 1, "a")]);
        let results =
            collect_positions(&ocr, predictions, &AlignOptions::default()).unwrap();
        let labels = results[0]
            .positions
            .iter()
            .map(|p| p.label.as_ref().unwrap().name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn overlapping_predictions_both_match() {
        let ocr = OcrDocument::new(vec![page(
            0,
            vec![token("Acme", 0, 4, bbox(0.0, 0.0, 40.0, 10.0))],
        )])
        .unwrap();
        let predictions = PredictionInput::Flat(vec![
            prediction("Vendor", 0, 4, "Acme"),
            prediction("Payee", 0, 4, "Acme"),
        ]);
        let results =
            collect_positions(&ocr, predictions, &AlignOptions::default()).unwrap();
        assert_eq!(results[0].positions.len(), 2);
        assert_eq!(results[0].positions[0].bbox, results[0].positions[1].bbox);
    }

    #[test]
    fn document_mode_returns_every_page() {
        let ocr = OcrDocument::new(vec![
            page(0, vec![token("one", 0, 3, bbox(0.0, 0.0, 10.0, 10.0))]),
            page(1, vec![token("two", 4, 7, bbox(0.0, 0.0, 10.0, 10.0))]),
        ])
        .unwrap();
        let predictions = PredictionInput::Flat(vec![prediction("N", 4, 7, "two")]);
        let results =
            collect_positions(&ocr, predictions, &AlignOptions::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].positions.is_empty());
        assert!(results[0].labels.is_empty());
        assert_eq!(results[1].page_num, 1);
        assert_eq!(results[1].labels.get("N"), Some(&1));
    }

    #[test]
    fn alignment_is_idempotent() {
        let ocr = OcrDocument::new(sample_ocr()).unwrap();
        let first =
            collect_positions(&ocr, vendor_prediction(), &AlignOptions::default()).unwrap();
        let second =
            collect_positions(&ocr, vendor_prediction(), &AlignOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reversed_predictions_fail_the_whole_call() {
        let ocr = OcrDocument::new(sample_ocr()).unwrap();
        let predictions = PredictionInput::Flat(vec![
            prediction("Vendor", 125, 150, "Amazon Web Services, Inc."),
            prediction("Bad", 10, 5, ""),
        ]);
        assert!(collect_positions(&ocr, predictions, &AlignOptions::default()).is_err());
    }

    #[test]
    fn page_results_round_trip_through_json() {
        let ocr = OcrDocument::new(sample_ocr()).unwrap();
        let results =
            collect_positions(&ocr, vendor_prediction(), &AlignOptions::default()).unwrap();
        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value[0]["positions"][0]["bbLeft"], json!(1070.0));
        assert_eq!(value[0]["positions"][0]["label"]["name"], json!("Vendor"));
        let parsed: Vec<PageResult> = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, results);
    }
}
