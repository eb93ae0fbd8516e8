//! Deciding which predictions belong to which page.

use crate::{
    errors::HighlightError,
    ocr::{Offset, OcrPage},
    predictions::{OffsetMode, Prediction},
    prelude::*,
};

/// The predictions to match against one page, plus that page's token offsets.
#[derive(Debug)]
pub struct PageBatch<'a> {
    pub page: &'a OcrPage,
    pub offsets: Vec<Offset>,
    pub predictions: &'a [Prediction],
}

/// Pair each page with its own prediction list. Offsets are page-local.
pub fn route_page_local<'a>(
    pages: &'a [OcrPage],
    lists: &'a [Vec<Prediction>],
) -> Result<Vec<PageBatch<'a>>, HighlightError> {
    if pages.len() != lists.len() {
        return Err(HighlightError::AlignmentInput(format!(
            "found {} per-page prediction lists for {} OCR pages",
            lists.len(),
            pages.len()
        )));
    }
    pages
        .iter()
        .zip(lists)
        .map(|(page, predictions)| {
            Ok(PageBatch {
                page,
                offsets: page.token_offsets(OffsetMode::PageLocal)?,
                predictions,
            })
        })
        .collect()
}

/// Split one sorted, document-wide prediction list across pages.
///
/// This is a single forward pass. Each page takes every remaining prediction
/// that starts at or before the end of its last token, and anything that
/// starts later is carried forward to the next page.
pub fn route_document_global<'a>(
    pages: &'a [OcrPage],
    predictions: &'a [Prediction],
) -> Result<Vec<PageBatch<'a>>, HighlightError> {
    let mut cursor = 0;
    let mut batches = Vec::with_capacity(pages.len());
    for page in pages {
        let offsets = page.token_offsets(OffsetMode::DocumentGlobal)?;
        let page_end = offsets.iter().map(|o| o.end).max();
        let taken = match page_end {
            Some(page_end) => predictions[cursor..]
                .iter()
                .take_while(|p| p.start <= page_end)
                .count(),
            // No tokens, so nothing can land here.
            None => 0,
        };
        trace!(
            page = page.info().page_num,
            ?page_end,
            taken,
            "Routed predictions to page"
        );
        batches.push(PageBatch {
            page,
            offsets,
            predictions: &predictions[cursor..cursor + taken],
        });
        cursor += taken;
    }

    if cursor < predictions.len() {
        warn!(
            unplaced = predictions.len() - cursor,
            first_start = predictions[cursor].start,
            "Some predictions start after the last OCR token and can't be placed"
        );
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        align::tests::{bbox, page, token},
        predictions::tests::prediction,
    };

    fn three_pages() -> Vec<OcrPage> {
        vec![
            page(0, vec![token("one", 0, 3, bbox(0.0, 0.0, 10.0, 10.0))]),
            page(1, vec![token("two", 4, 7, bbox(0.0, 0.0, 10.0, 10.0))]),
            page(2, vec![token("three", 8, 13, bbox(0.0, 0.0, 10.0, 10.0))]),
        ]
    }

    #[test]
    fn predictions_are_carried_forward() {
        let pages = three_pages();
        let preds = vec![prediction("b", 4, 7, "two"), prediction("c", 8, 13, "three")];
        let batches = route_document_global(&pages, &preds).unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches[0].predictions.is_empty());
        assert_eq!(batches[1].predictions, &preds[0..1]);
        assert_eq!(batches[2].predictions, &preds[1..2]);
    }

    #[test]
    fn no_prediction_is_counted_twice() {
        let pages = three_pages();
        let preds = vec![prediction("a", 0, 3, "one")];
        let batches = route_document_global(&pages, &preds).unwrap();
        let total = batches.iter().map(|b| b.predictions.len()).sum::<usize>();
        assert_eq!(total, 1);
        assert_eq!(batches[0].predictions.len(), 1);
    }

    #[test]
    fn empty_pages_take_nothing() {
        let pages = vec![
            page(0, vec![]),
            page(1, vec![token("x", 0, 1, bbox(0.0, 0.0, 1.0, 1.0))]),
        ];
        let preds = vec![prediction("a", 0, 1, "x")];
        let batches = route_document_global(&pages, &preds).unwrap();
        assert!(batches[0].predictions.is_empty());
        assert_eq!(batches[1].predictions.len(), 1);
    }

    #[test]
    fn trailing_predictions_are_left_over() {
        let pages = three_pages();
        let preds = vec![prediction("z", 100, 110, "late")];
        let batches = route_document_global(&pages, &preds).unwrap();
        assert!(batches.iter().all(|b| b.predictions.is_empty()));
    }

    #[test]
    fn page_local_requires_matching_lengths() {
        let pages = three_pages();
        let lists = vec![vec![], vec![]];
        assert!(route_page_local(&pages, &lists).is_err());
    }
}
