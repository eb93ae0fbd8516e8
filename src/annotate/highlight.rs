//! Highlighting predictions.

use super::{AlignedDocument, AnnotationSummary, label_name};
use crate::{
    color::ColorMap,
    errors::HighlightError,
    pdf::{PdfEditor, TEXT_PAGE_FONT_SIZE},
    prelude::*,
};

/// Highlight opacity.
const OPACITY: f32 = 0.5;

/// Options for [`AlignedDocument::highlight`].
#[derive(Clone, Debug, Default)]
pub struct HighlightOptions {
    /// Highlight colors for each label.
    pub colors: ColorMap,

    /// If set, insert a table of contents page at the front of the document,
    /// naming this file.
    pub toc_filename: Option<String>,

    /// Append a page showing which color goes with which label.
    pub legend: bool,
}

impl AlignedDocument {
    /// Highlight every position with its label's color.
    ///
    /// Every position must have a label. We check this before touching the
    /// PDF.
    #[instrument(level = "debug", skip_all)]
    pub fn highlight<E>(
        &self,
        editor: &mut E,
        options: &HighlightOptions,
    ) -> Result<AnnotationSummary>
    where
        E: PdfEditor + ?Sized,
    {
        for page in &self.pages {
            if page.positions.iter().any(|p| p.label.is_none()) {
                return Err(HighlightError::MissingLabel {
                    page: page.page_num,
                }
                .into());
            }
        }

        let mut summary = AnnotationSummary::default();
        for (page, scale) in self.scaled_pages(editor)? {
            for position in &page.positions {
                let label = label_name(position).ok_or(HighlightError::MissingLabel {
                    page: page.page_num,
                })?;
                editor.add_highlight(
                    page.page_num,
                    scale.apply(&position.bbox),
                    options.colors.color_for(label),
                    OPACITY,
                    label,
                )?;
                summary.regions += 1;
            }
            if !page.positions.is_empty() {
                summary.pages += 1;
            }
        }

        if options.legend {
            let entries = options.colors.legend(self.labels());
            let end = editor.page_count();
            editor.insert_legend_page(end, &entries)?;
        }
        if let Some(filename) = &options.toc_filename {
            editor.insert_text_page(0, &self.toc_text(filename), TEXT_PAGE_FONT_SIZE)?;
        }
        debug!(?summary, "Highlighted predictions");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        annotate::tests::{Edit, RecordingEditor, page_result, position},
        color::Color,
    };

    fn colors() -> ColorMap {
        let mut colors = BTreeMap::new();
        colors.insert("Vendor".to_owned(), Color::WHITE);
        ColorMap::new(Color::YELLOW, colors)
    }

    #[test]
    fn highlights_are_scaled_and_colored() {
        let doc = AlignedDocument::new(vec![page_result(
            0,
            vec![position(Some(("Vendor", 25))), position(Some(("Total", 5)))],
        )]);
        let mut editor = RecordingEditor::letter(1);
        let options = HighlightOptions {
            colors: colors(),
            ..Default::default()
        };
        let summary = doc.highlight(&mut editor, &options).unwrap();
        assert_eq!(
            summary,
            AnnotationSummary {
                pages: 1,
                regions: 2
            }
        );

        let Edit::Highlight {
            page,
            rect,
            color,
            opacity,
            label,
        } = &editor.edits[0]
        else {
            panic!("expected a highlight, got {:?}", editor.edits[0]);
        };
        assert_eq!(*page, 0);
        assert_eq!(*color, Color::WHITE);
        assert_eq!(*opacity, 0.5);
        assert_eq!(label, "Vendor");
        // 612 / 2550 == 0.24
        assert!((rect.x0 - 1070.0 * 0.24).abs() < 1e-6);
        assert!((rect.x1 - 1878.0 * 0.24).abs() < 1e-6);

        let Edit::Highlight { color, .. } = &editor.edits[1] else {
            panic!("expected a highlight");
        };
        assert_eq!(*color, Color::YELLOW);
    }

    #[test]
    fn missing_labels_fail_before_any_edit() {
        let doc = AlignedDocument::new(vec![
            page_result(0, vec![position(Some(("Vendor", 25)))]),
            page_result(1, vec![position(None)]),
        ]);
        let mut editor = RecordingEditor::letter(2);
        let err = doc
            .highlight(&mut editor, &HighlightOptions::default())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<HighlightError>(),
            Some(&HighlightError::MissingLabel { page: 1 })
        );
        assert!(editor.edits.is_empty());
    }

    #[test]
    fn empty_pages_are_fine() {
        let doc = AlignedDocument::new(vec![page_result(0, vec![])]);
        let mut editor = RecordingEditor::letter(1);
        let summary = doc
            .highlight(&mut editor, &HighlightOptions::default())
            .unwrap();
        assert_eq!(summary, AnnotationSummary::default());
        assert!(editor.edits.is_empty());
    }

    #[test]
    fn toc_goes_first_and_legend_last() {
        let doc = AlignedDocument::new(vec![page_result(
            0,
            vec![position(Some(("Vendor", 25)))],
        )]);
        let mut editor = RecordingEditor::letter(1);
        let options = HighlightOptions {
            colors: colors(),
            toc_filename: Some("invoice.pdf".to_owned()),
            legend: true,
        };
        doc.highlight(&mut editor, &options).unwrap();
        assert_eq!(
            editor.edits[1],
            Edit::LegendPage {
                at: 1,
                entries: vec![("Vendor".to_owned(), Color::WHITE)],
            }
        );
        let Edit::TextPage { at, text } = &editor.edits[2] else {
            panic!("expected a text page");
        };
        assert_eq!(*at, 0);
        assert!(text.starts_with("File: invoice.pdf\n"));
        assert!(text.ends_with("Page 1: Vendor (1)"));
        assert_eq!(editor.page_count(), 3);
    }
}
