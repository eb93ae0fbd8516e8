//! Matching predictions to tokens on a single page, and merging the matched
//! tokens into one box per visual line.

use std::collections::BTreeMap;

use crate::{
    ocr::{BoundingBox, Offset, OcrPage, Token},
    predictions::Prediction,
};

use super::{PageResult, PositionLabel, PositionRecord};

/// A prediction's span, widened by one character on each side. OCR
/// tokenization sometimes attaches punctuation to a token ("Services,") and
/// sometimes doesn't, so we allow a little slop at both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// The tolerant span for `prediction`.
    pub fn widened(prediction: &Prediction) -> Self {
        Self {
            start: prediction.start.saturating_sub(1),
            end: prediction.end.saturating_add(1),
        }
    }

    /// Does `offset` lie entirely within this span?
    pub fn contains(&self, offset: &Offset) -> bool {
        offset.start >= self.start && offset.end <= self.end
    }
}

/// Compute the boxes covering one prediction.
///
/// Matched tokens are merged left to right. A token whose top edge is below
/// the bottom of the current box starts a new line, and therefore a new box.
pub fn boxes_for_prediction(
    tokens: &[Token],
    offsets: &[Offset],
    prediction: &Prediction,
) -> Vec<BoundingBox> {
    let span = Span::widened(prediction);
    let (mut boxes, open) = tokens
        .iter()
        .zip(offsets)
        .filter(|(_, offset)| span.contains(offset))
        .fold(
            (Vec::new(), None::<BoundingBox>),
            |(mut boxes, open), (token, _)| {
                let next = match open {
                    None => token.position,
                    Some(current) if token.position.top > current.bottom => {
                        boxes.push(current);
                        token.position
                    }
                    Some(current) => current.union(&token.position),
                };
                (boxes, Some(next))
            },
        );
    boxes.extend(open);
    boxes
}

/// Match a page's predictions against its tokens.
///
/// `offsets` must be parallel to `page.tokens`, and `predictions` must
/// already be limited to this page and sorted by start offset.
pub fn match_page(
    page: &OcrPage,
    offsets: &[Offset],
    predictions: &[Prediction],
    include_text: bool,
) -> PageResult {
    let mut positions = Vec::new();
    let mut labels = BTreeMap::new();
    for prediction in predictions {
        let boxes = boxes_for_prediction(&page.tokens, offsets, prediction);
        if boxes.is_empty() {
            continue;
        }
        *labels.entry(prediction.label.clone()).or_insert(0) += 1;
        positions.extend(boxes.into_iter().map(|bbox| PositionRecord {
            bbox,
            label: Some(PositionLabel {
                name: prediction.label.clone(),
                text_len: prediction.text_len(),
            }),
            full_text: include_text.then(|| prediction.text.clone()),
        }));
    }

    let info = page.info();
    PageResult {
        page_num: info.page_num,
        dimensions: info.size,
        positions,
        labels,
    }
}
