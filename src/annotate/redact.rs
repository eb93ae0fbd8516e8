//! Redaction, with or without replacement text.

use rand::Rng;

use super::{AlignedDocument, AnnotationSummary, label_name};
use crate::{color::Color, fill::FillRules, pdf::PdfEditor, prelude::*};

/// How much to grow each redaction, as a fraction of its height, on every
/// side.
const REDACTION_INFLATION: f64 = 0.1;

/// Options for [`AlignedDocument::redact`].
#[derive(Clone, Copy, Debug)]
pub struct RedactOptions {
    pub fill: Color,
}

impl Default for RedactOptions {
    fn default() -> Self {
        Self { fill: Color::BLACK }
    }
}

fn warn_about_rasterizing() {
    warn!(
        "Redacted text is removed from the page content, but to be sure nothing \
         can be recovered, convert the output to an image-based PDF or image files"
    );
}

impl AlignedDocument {
    /// Cover every position with a solid fill and remove the text under it.
    #[instrument(level = "debug", skip_all)]
    pub fn redact<E>(&self, editor: &mut E, options: &RedactOptions) -> Result<AnnotationSummary>
    where
        E: PdfEditor + ?Sized,
    {
        let mut summary = AnnotationSummary::default();
        for (page, scale) in self.scaled_pages(editor)? {
            if page.positions.is_empty() {
                continue;
            }
            for position in &page.positions {
                let rect = scale.apply(&position.bbox).inflate(REDACTION_INFLATION);
                editor.add_redaction(page.page_num, rect, options.fill, None)?;
                summary.regions += 1;
            }
            editor.apply_redactions(page.page_num)?;
            summary.pages += 1;
        }
        warn_about_rasterizing();
        Ok(summary)
    }

    /// Blank out every position and draw fake data of the same kind over it.
    ///
    /// Positions without a label are blanked with no replacement text. Every
    /// label must have a fill rule; this is checked before touching the PDF.
    #[instrument(level = "debug", skip_all)]
    pub fn redact_and_replace<E, R>(
        &self,
        editor: &mut E,
        rules: &FillRules,
        rng: &mut R,
    ) -> Result<AnnotationSummary>
    where
        E: PdfEditor + ?Sized,
        R: Rng + ?Sized,
    {
        for page in &self.pages {
            for label in page.positions.iter().filter_map(label_name) {
                rules.category_for(label)?;
            }
        }

        let mut summary = AnnotationSummary::default();
        for (page, scale) in self.scaled_pages(editor)? {
            if page.positions.is_empty() {
                continue;
            }
            for position in &page.positions {
                let rect = scale.apply(&position.bbox).inflate(REDACTION_INFLATION);
                let text = match &position.label {
                    Some(label) => {
                        let category = rules.category_for(&label.name)?;
                        Some(category.generate(label.text_len, rng))
                    }
                    None => None,
                };
                trace!(page = page.page_num, ?text, "Replacing region");
                editor.add_redaction(page.page_num, rect, Color::WHITE, text.as_deref())?;
                summary.regions += 1;
            }
            editor.apply_redactions(page.page_num)?;
            summary.pages += 1;
        }
        warn_about_rasterizing();
        Ok(summary)
    }
}
