//! Editing PDF files.
//!
//! The alignment and annotation code only talks to [`PdfEditor`], which hides
//! the PDF library. All rectangles passed to an editor are in PDF points,
//! measured from the top left corner of the page, which is how OCR boxes are
//! measured.

use crate::{color::Color, geometry::Rect, ocr::PageSize, prelude::*};

mod content;
mod lopdf_editor;

pub use self::lopdf_editor::LopdfEditor;

/// Font size used for inserted text pages, like the table of contents.
pub const TEXT_PAGE_FONT_SIZE: f32 = 13.0;

/// The operations we need from a PDF library.
///
/// Page indices are 0-based.
pub trait PdfEditor {
    /// How many pages are in the document?
    fn page_count(&self) -> usize;

    /// The size of `page`, in points.
    fn page_size(&self, page: usize) -> Result<PageSize>;

    /// Add a translucent highlight annotation.
    fn add_highlight(
        &mut self,
        page: usize,
        rect: Rect,
        color: Color,
        opacity: f32,
        label: &str,
    ) -> Result<()>;

    /// Mark `rect` for redaction. Nothing changes until
    /// [`PdfEditor::apply_redactions`] is called for the page. If `text` is
    /// present, it will be drawn over the filled area.
    fn add_redaction(
        &mut self,
        page: usize,
        rect: Rect,
        fill: Color,
        text: Option<&str>,
    ) -> Result<()>;

    /// Remove text under all pending redactions on `page`, then paint the
    /// redaction fills and any replacement text.
    fn apply_redactions(&mut self, page: usize) -> Result<()>;

    /// Insert a new page containing `text` before page `at`. Long text may
    /// produce more than one page.
    fn insert_text_page(&mut self, at: usize, text: &str, font_size: f32) -> Result<()>;

    /// Insert a page showing a swatch of each color next to its label.
    fn insert_legend_page(&mut self, at: usize, entries: &[(String, Color)]) -> Result<()>;

    /// Save the document to `path`.
    fn save(&mut self, path: &Path) -> Result<()>;
}

/// Load a PDF from disk.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn open(path: &Path) -> Result<LopdfEditor> {
    LopdfEditor::load(path)
}
