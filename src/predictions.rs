//! Model predictions.

use clap::ValueEnum;
use schemars::JsonSchema;

use crate::{errors::HighlightError, prelude::*};

/// Which text a prediction's offsets point into.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// One prediction list per page, with offsets into that page's text.
    #[serde(alias = "page")]
    #[value(name = "page")]
    PageLocal,

    /// One prediction list for the whole document, with offsets into the
    /// full document text.
    #[default]
    #[serde(alias = "document")]
    #[value(name = "document")]
    DocumentGlobal,
}

impl OffsetMode {
    /// The name of the token field holding offsets for this mode.
    pub fn offset_field(self) -> &'static str {
        match self {
            OffsetMode::PageLocal => "page_offset",
            OffsetMode::DocumentGlobal => "doc_offset",
        }
    }
}

/// A single labeled span returned by the model.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Prediction {
    /// The label assigned by the model.
    pub label: String,

    /// The first character of the span.
    pub start: usize,

    /// One past the last character of the span.
    pub end: usize,

    /// The text of the span.
    pub text: String,
}

impl Prediction {
    /// Check that this prediction is usable.
    pub fn validate(&self) -> Result<(), HighlightError> {
        if self.start > self.end {
            return Err(HighlightError::AlignmentInput(format!(
                "prediction {:?} ({:?}) starts at {} but ends at {}",
                self.label, self.text, self.start, self.end
            )));
        }
        Ok(())
    }

    /// The length of the predicted text, in characters.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Predictions as returned by the prediction service.
///
/// The service returns one list per submitted text. When the whole document
/// was submitted at once, that's a single list; when pages were submitted
/// separately, it's one list per page. We also accept a bare list.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionInput {
    /// One list of predictions per submitted text.
    Nested(Vec<Vec<Prediction>>),
    /// A single list of predictions.
    Flat(Vec<Prediction>),
}

impl PredictionInput {
    /// Load predictions from a JSON file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        crate::async_utils::io::read_json_or_toml::<Self>(path).await
    }

    /// Get a single, document-wide prediction list.
    pub fn into_document_predictions(self) -> Result<Vec<Prediction>, HighlightError> {
        match self {
            PredictionInput::Flat(predictions) => Ok(predictions),
            PredictionInput::Nested(mut lists) => match lists.len() {
                0 => Ok(vec![]),
                1 => Ok(lists.remove(0)),
                n => Err(HighlightError::AlignmentInput(format!(
                    "expected one prediction list for the whole document, found {}; \
                     use page offsets for per-page predictions",
                    n
                ))),
            },
        }
    }

    /// Get one prediction list per page.
    pub fn into_page_predictions(
        self,
        page_count: usize,
    ) -> Result<Vec<Vec<Prediction>>, HighlightError> {
        let lists = match self {
            // `[]` parses as an empty nested list, but for one page it's a
            // page with no predictions.
            PredictionInput::Nested(lists) if lists.is_empty() && page_count == 1 => vec![vec![]],
            PredictionInput::Nested(lists) => lists,
            // A bare list only makes sense for a single page.
            PredictionInput::Flat(predictions) => vec![predictions],
        };
        if lists.len() != page_count {
            return Err(HighlightError::AlignmentInput(format!(
                "found {} per-page prediction lists for {} OCR pages",
                lists.len(),
                page_count
            )));
        }
        Ok(lists)
    }
}

/// Sort predictions by start offset, keeping the original order for ties.
pub fn sort_by_start(predictions: &mut [Prediction]) {
    predictions.sort_by_key(|p| p.start);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn prediction(label: &str, start: usize, end: usize, text: &str) -> Prediction {
        Prediction {
            label: label.to_owned(),
            start,
            end,
            text: text.to_owned(),
        }
    }

    #[test]
    fn parses_nested_and_flat_input() {
        let nested: PredictionInput = serde_json::from_value(json!([[
            { "label": "Vendor", "start": 125, "end": 150, "text": "Amazon Web Services, Inc." }
        ]]))
        .unwrap();
        assert!(matches!(nested, PredictionInput::Nested(ref l) if l.len() == 1));

        let flat: PredictionInput = serde_json::from_value(json!([
            { "label": "Vendor", "start": 125, "end": 150, "text": "Amazon",
              "confidence": { "Vendor": 0.98 } }
        ]))
        .unwrap();
        assert!(matches!(flat, PredictionInput::Flat(ref l) if l.len() == 1));
    }

    #[test]
    fn document_predictions_reject_multiple_lists() {
        let input = PredictionInput::Nested(vec![vec![], vec![]]);
        assert!(matches!(
            input.into_document_predictions(),
            Err(HighlightError::AlignmentInput(_))
        ));
    }

    #[test]
    fn an_empty_list_is_an_empty_single_page() {
        let input: PredictionInput = serde_json::from_value(json!([])).unwrap();
        assert_eq!(
            input.clone().into_page_predictions(1).unwrap(),
            vec![Vec::<Prediction>::new()]
        );
        assert!(input.clone().into_document_predictions().unwrap().is_empty());
        assert!(input.into_page_predictions(2).is_err());
    }

    #[test]
    fn page_predictions_must_match_page_count() {
        let input = PredictionInput::Nested(vec![vec![], vec![]]);
        assert_eq!(input.clone().into_page_predictions(2).unwrap().len(), 2);
        assert!(input.into_page_predictions(3).is_err());
    }

    #[test]
    fn sort_is_stable() {
        let mut preds = vec![
            prediction("b", 10, 12, "bb"),
            prediction("a", 3, 5, "aa"),
            prediction("c", 10, 11, "c"),
        ];
        sort_by_start(&mut preds);
        let labels = preds.iter().map(|p| p.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[test]
    fn validate_rejects_reversed_spans() {
        assert!(prediction("x", 5, 4, "").validate().is_err());
        assert!(prediction("x", 4, 4, "").validate().is_ok());
    }

    #[test]
    fn text_len_counts_characters() {
        assert_eq!(prediction("x", 0, 5, "Zürich").text_len(), 6);
    }
}
