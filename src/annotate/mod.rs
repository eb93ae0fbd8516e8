//! Turning aligned predictions into PDF edits.
//!
//! An [`AlignedDocument`] holds the per-page alignment output. Each operation
//! applies it to a [`PdfEditor`] holding a copy of the source PDF.

use std::collections::BTreeSet;

use crate::{
    align::{AlignOptions, PageResult, PositionRecord, collect_positions},
    errors::HighlightError,
    geometry::Scale,
    ocr::OcrDocument,
    pdf::PdfEditor,
    predictions::PredictionInput,
    prelude::*,
};

mod highlight;
mod redact;

pub use self::{
    highlight::HighlightOptions,
    redact::RedactOptions,
};

/// How many pages and regions an operation touched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub pages: usize,
    pub regions: usize,
}

/// Alignment results for a whole document, ready to apply to a PDF.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedDocument {
    pages: Vec<PageResult>,
}

impl AlignedDocument {
    pub fn new(pages: Vec<PageResult>) -> Self {
        Self { pages }
    }

    /// Align `predictions` against `ocr`.
    pub fn align(
        ocr: &OcrDocument,
        predictions: PredictionInput,
        options: &AlignOptions,
    ) -> Result<Self, HighlightError> {
        Ok(Self::new(collect_positions(ocr, predictions, options)?))
    }

    /// Load previously saved alignment results.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let pages = crate::async_utils::io::read_json_or_toml::<Vec<PageResult>>(path).await?;
        Ok(Self::new(pages))
    }

    pub fn pages(&self) -> &[PageResult] {
        &self.pages
    }

    /// Every label that matched somewhere in the document.
    pub fn labels(&self) -> BTreeSet<&str> {
        self.pages
            .iter()
            .flat_map(|p| p.labels.keys().map(String::as_str))
            .collect()
    }

    /// A plain-text summary of which labels were found on which pages.
    pub fn toc_text(&self, filename: &str) -> String {
        let mut text = format!("File: {}\n\nPages w/ Extractions found:\n\n", filename);
        let lines = self
            .pages
            .iter()
            .filter(|page| !page.labels.is_empty())
            .map(|page| {
                let counts = page
                    .labels
                    .iter()
                    .map(|(label, count)| format!("{} ({})", label, count))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Page {}: {}", page.page_num + 1, counts)
            })
            .collect::<Vec<_>>();
        text.push_str(&lines.join("\n"));
        text
    }

    /// Pair each page result with the scale from OCR pixels to PDF points.
    fn scaled_pages<E>(&self, editor: &E) -> Result<Vec<(&PageResult, Scale)>>
    where
        E: PdfEditor + ?Sized,
    {
        self.pages
            .iter()
            .map(|page| {
                if page.page_num >= editor.page_count() {
                    return Err(anyhow!(
                        "predictions refer to page {}, but the PDF only has {} pages",
                        page.page_num + 1,
                        editor.page_count()
                    ));
                }
                let scale = Scale::new(editor.page_size(page.page_num)?, page.dimensions)
                    .with_context(|| format!("cannot scale page {}", page.page_num + 1))?;
                if page.positions.is_empty() {
                    info!(page = page.page_num + 1, "No predictions to mark on page");
                }
                Ok((page, scale))
            })
            .collect()
    }
}

/// The label name of a position, if it has one.
fn label_name(position: &PositionRecord) -> Option<&str> {
    position.label.as_ref().map(|l| l.name.as_str())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        align::{PositionLabel, tests::bbox},
        color::Color,
        geometry::Rect,
        ocr::PageSize,
    };

    /// Something we did to a [`RecordingEditor`].
    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum Edit {
        Highlight {
            page: usize,
            rect: Rect,
            color: Color,
            opacity: f32,
            label: String,
        },
        Redaction {
            page: usize,
            rect: Rect,
            fill: Color,
            text: Option<String>,
        },
        Apply {
            page: usize,
        },
        TextPage {
            at: usize,
            text: String,
        },
        LegendPage {
            at: usize,
            entries: Vec<(String, Color)>,
        },
    }

    /// An in-memory editor that records every call.
    pub(crate) struct RecordingEditor {
        pub(crate) sizes: Vec<PageSize>,
        pub(crate) edits: Vec<Edit>,
    }

    impl RecordingEditor {
        /// `count` US Letter pages.
        pub(crate) fn letter(count: usize) -> Self {
            Self {
                sizes: vec![
                    PageSize {
                        width: 612.0,
                        height: 792.0
                    };
                    count
                ],
                edits: vec![],
            }
        }
    }

    impl PdfEditor for RecordingEditor {
        fn page_count(&self) -> usize {
            self.sizes.len()
        }

        fn page_size(&self, page: usize) -> Result<PageSize> {
            self.sizes
                .get(page)
                .copied()
                .ok_or_else(|| anyhow!("no page {}", page))
        }

        fn add_highlight(
            &mut self,
            page: usize,
            rect: Rect,
            color: Color,
            opacity: f32,
            label: &str,
        ) -> Result<()> {
            self.edits.push(Edit::Highlight {
                page,
                rect,
                color,
                opacity,
                label: label.to_owned(),
            });
            Ok(())
        }

        fn add_redaction(
            &mut self,
            page: usize,
            rect: Rect,
            fill: Color,
            text: Option<&str>,
        ) -> Result<()> {
            self.edits.push(Edit::Redaction {
                page,
                rect,
                fill,
                text: text.map(str::to_owned),
            });
            Ok(())
        }

        fn apply_redactions(&mut self, page: usize) -> Result<()> {
            self.edits.push(Edit::Apply { page });
            Ok(())
        }

        fn insert_text_page(&mut self, at: usize, text: &str, _font_size: f32) -> Result<()> {
            self.sizes.insert(at, self.sizes[0]);
            self.edits.push(Edit::TextPage {
                at,
                text: text.to_owned(),
            });
            Ok(())
        }

        fn insert_legend_page(&mut self, at: usize, entries: &[(String, Color)]) -> Result<()> {
            self.sizes.insert(
                at,
                PageSize {
                    width: 800.0,
                    height: 600.0,
                },
            );
            self.edits.push(Edit::LegendPage {
                at,
                entries: entries.to_vec(),
            });
            Ok(())
        }

        fn save(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    pub(crate) fn position(label: Option<(&str, usize)>) -> PositionRecord {
        PositionRecord {
            bbox: bbox(1070.0, 282.0, 1878.0, 342.0),
            label: label.map(|(name, text_len)| PositionLabel {
                name: name.to_owned(),
                text_len,
            }),
            full_text: None,
        }
    }

    pub(crate) fn page_result(page_num: usize, positions: Vec<PositionRecord>) -> PageResult {
        let mut labels = BTreeMap::new();
        for position in &positions {
            if let Some(name) = label_name(position) {
                *labels.entry(name.to_owned()).or_insert(0) += 1;
            }
        }
        PageResult {
            page_num,
            dimensions: PageSize {
                width: 2550.0,
                height: 3300.0,
            },
            positions,
            labels,
        }
    }

    #[test]
    fn toc_lists_pages_with_matches() {
        let mut first = page_result(0, vec![position(Some(("Vendor", 25)))]);
        first.labels.insert("Total".to_owned(), 2);
        let doc = AlignedDocument::new(vec![
            first,
            page_result(1, vec![]),
            page_result(2, vec![position(Some(("Name", 3)))]),
        ]);
        assert_eq!(
            doc.toc_text("invoice.pdf"),
            "File: invoice.pdf\n\nPages w/ Extractions found:\n\n\
             Page 1: Total (2), Vendor (1)\n\
             Page 3: Name (1)"
        );
    }

    #[test]
    fn toc_without_matches_is_just_the_header() {
        let doc = AlignedDocument::new(vec![page_result(0, vec![])]);
        assert_eq!(
            doc.toc_text("a.pdf"),
            "File: a.pdf\n\nPages w/ Extractions found:\n\n"
        );
    }

    #[test]
    fn labels_are_collected_across_pages() {
        let doc = AlignedDocument::new(vec![
            page_result(0, vec![position(Some(("b", 1)))]),
            page_result(1, vec![position(Some(("a", 1))), position(Some(("b", 1)))]),
        ]);
        assert_eq!(doc.labels().into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn pages_beyond_the_pdf_are_rejected() {
        let doc = AlignedDocument::new(vec![page_result(3, vec![])]);
        let editor = RecordingEditor::letter(2);
        assert!(doc.scaled_pages(&editor).is_err());
    }

    #[test]
    fn zero_sized_ocr_pages_are_rejected() {
        let mut page = page_result(0, vec![]);
        page.dimensions.height = 0.0;
        let doc = AlignedDocument::new(vec![page]);
        assert!(doc.scaled_pages(&RecordingEditor::letter(1)).is_err());
    }
}
