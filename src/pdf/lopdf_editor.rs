//! [`PdfEditor`] backed by `lopdf`.

use std::{collections::HashMap, fs, io::BufWriter};

use lopdf::{
    Dictionary, Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};

use super::{
    PdfEditor,
    content::{FontTable, FontWidths, UserRect, encode_win_ansi, fill_rect, show_text, strip_text},
};
use crate::{color::Color, geometry::Rect, ocr::PageSize, prelude::*};

/// Resource name for the font we draw replacement text with.
const FONT_RESOURCE: &str = "FHighlighter";

/// Letter size, in points.
const TEXT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);
const TEXT_PAGE_MARGIN: f64 = 72.0;

/// Legend layout: a grid of color swatches.
const LEGEND_PAGE_SIZE: (f64, f64) = (800.0, 600.0);
const LEGEND_CELL: (f64, f64) = (80.0, 60.0);
const LEGEND_FONT_SIZE: f32 = 8.0;

/// A redaction waiting for [`PdfEditor::apply_redactions`].
#[derive(Clone, Debug)]
struct PendingRedaction {
    rect: UserRect,
    fill: Color,
    text: Option<String>,
}

/// A PDF document loaded into memory.
pub struct LopdfEditor {
    doc: Document,
    /// Page object IDs, in page order.
    pages: Vec<ObjectId>,
    pending: HashMap<ObjectId, Vec<PendingRedaction>>,
    font: Option<ObjectId>,
}

impl LopdfEditor {
    /// Load a PDF file.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = Document::load(path)
            .with_context(|| format!("could not read PDF {:?}", path.display()))?;
        Self::from_document(doc)
    }

    /// Wrap an already-loaded document.
    pub fn from_document(doc: Document) -> Result<Self> {
        if doc.is_encrypted() {
            return Err(anyhow!("encrypted PDFs are not supported"));
        }
        let pages = doc.get_pages().into_values().collect::<Vec<_>>();
        debug!(pages = pages.len(), "Loaded PDF");
        Ok(Self {
            doc,
            pages,
            pending: HashMap::new(),
            font: None,
        })
    }

    /// The underlying document.
    #[cfg(test)]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn page_id(&self, page: usize) -> Result<ObjectId> {
        self.pages.get(page).copied().ok_or_else(|| {
            anyhow!(
                "page {} does not exist; the PDF has {} pages",
                page + 1,
                self.pages.len()
            )
        })
    }

    /// Look up a page attribute, following `Parent` links for inherited
    /// attributes.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Result<Option<&Object>> {
        let mut node = self.doc.get_dictionary(page_id)?;
        for _ in 0..64 {
            if let Ok(value) = node.get(key) {
                return Ok(Some(self.doc.dereference(value)?.1));
            }
            match node.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => node = self.doc.get_dictionary(parent)?,
                Err(_) => return Ok(None),
            }
        }
        Err(anyhow!("page tree is too deep or contains a cycle"))
    }

    /// The page's MediaBox as `[llx, lly, urx, ury]`.
    fn media_box(&self, page_id: ObjectId) -> Result<[f64; 4]> {
        let media_box = self
            .inherited(page_id, b"MediaBox")?
            .ok_or_else(|| anyhow!("page has no MediaBox"))?
            .as_array()?;
        if media_box.len() != 4 {
            return Err(anyhow!("MediaBox has {} entries", media_box.len()));
        }
        let mut out = [0.0; 4];
        for (slot, value) in out.iter_mut().zip(media_box) {
            *slot = f64::from(self.doc.dereference(value)?.1.as_float()?);
        }
        let [x0, y0, x1, y1] = out;
        Ok([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
    }

    /// Convert a top-left-origin rectangle to PDF user space.
    fn to_user_space(&self, page_id: ObjectId, rect: &Rect) -> Result<UserRect> {
        let [llx, _, _, ury] = self.media_box(page_id)?;
        Ok(UserRect {
            x0: llx + rect.x0,
            y0: ury - rect.y1,
            x1: llx + rect.x1,
            y1: ury - rect.y0,
        })
    }

    /// The shared Helvetica font object, created on first use.
    /// Glyph widths for the simple fonts used on a page. Fonts we can't
    /// measure are left out.
    fn font_widths(&self, page_id: ObjectId) -> FontTable {
        let fonts = self.doc.get_page_fonts(page_id).unwrap_or_default();
        fonts
            .into_iter()
            .filter_map(|(name, font)| Some((name, self.simple_font_widths(font)?)))
            .collect()
    }

    fn simple_font_widths(&self, font: &Dictionary) -> Option<FontWidths> {
        let subtype = font.get(b"Subtype").and_then(Object::as_name).ok()?;
        if subtype == b"Type0" || subtype == b"Type3" {
            return None;
        }
        let widths = resolve(&self.doc, font.get(b"Widths").ok()?)?
            .as_array()
            .ok()?
            .iter()
            .map(|w| resolve(&self.doc, w)?.as_float().ok().map(f64::from))
            .collect::<Option<Vec<_>>>()?;
        let first_char = font.get(b"FirstChar").and_then(Object::as_i64).ok()?;
        let missing_width = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|d| resolve(&self.doc, d))
            .and_then(|d| d.as_dict().ok())
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(|w| w.as_float().ok())
            .map_or(0.0, f64::from);
        Some(FontWidths {
            first_char: u32::try_from(first_char).ok()?,
            widths,
            missing_width,
        })
    }

    fn font(&mut self) -> ObjectId {
        if let Some(id) = self.font {
            return id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font = Some(id);
        id
    }

    /// Make sure the page's resources include our font.
    ///
    /// Inherited resources are copied onto the page first, so we never touch
    /// resources that other pages might be using through the page tree.
    fn add_font_resource(&mut self, page_id: ObjectId) -> Result<()> {
        let font_id = self.font();

        // `None` means the page has its own inline Resources dictionary.
        let resources_id = match self.doc.get_dictionary(page_id)?.get(b"Resources") {
            Ok(Object::Reference(id)) => Some(Some(*id)),
            Ok(Object::Dictionary(_)) => Some(None),
            Ok(other) => {
                return Err(anyhow!("page Resources is a {}", other.enum_variant()));
            }
            Err(_) => None,
        };
        let resources_id = match resources_id {
            Some(resources_id) => resources_id,
            None => {
                let inherited = match self.inherited(page_id, b"Resources")? {
                    Some(Object::Dictionary(dict)) => dict.clone(),
                    _ => Dictionary::new(),
                };
                self.doc
                    .get_dictionary_mut(page_id)?
                    .set("Resources", inherited);
                None
            }
        };

        // Find the Font dictionary, which may itself be a reference.
        let resources = match resources_id {
            Some(id) => self.doc.get_dictionary(id)?,
            None => self.doc.get_dictionary(page_id)?.get(b"Resources")?.as_dict()?,
        };
        let font_dict_id = match resources.get(b"Font") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };

        if let Some(id) = font_dict_id {
            self.doc
                .get_dictionary_mut(id)?
                .set(FONT_RESOURCE, font_id);
            return Ok(());
        }
        let resources = match resources_id {
            Some(id) => self.doc.get_dictionary_mut(id)?,
            None => self
                .doc
                .get_dictionary_mut(page_id)?
                .get_mut(b"Resources")?
                .as_dict_mut()?,
        };
        if matches!(resources.get(b"Font"), Ok(Object::Dictionary(_))) {
            resources
                .get_mut(b"Font")?
                .as_dict_mut()?
                .set(FONT_RESOURCE, font_id);
        } else {
            resources.set("Font", dictionary! { FONT_RESOURCE => font_id });
        }
        Ok(())
    }

    /// Append an annotation to the page's `Annots` array.
    fn push_annotation(&mut self, page_id: ObjectId, annot_id: ObjectId) -> Result<()> {
        let annots_ref = match self.doc.get_dictionary(page_id)?.get(b"Annots") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };
        if let Some(id) = annots_ref {
            self.doc
                .get_object_mut(id)?
                .as_array_mut()?
                .push(annot_id.into());
            return Ok(());
        }
        let page = self.doc.get_dictionary_mut(page_id)?;
        if matches!(page.get(b"Annots"), Ok(Object::Array(_))) {
            page.get_mut(b"Annots")?
                .as_array_mut()?
                .push(annot_id.into());
        } else {
            page.set("Annots", vec![Object::from(annot_id)]);
        }
        Ok(())
    }

    /// Insert new pages before page `at` in the root of the page tree.
    fn insert_pages(&mut self, at: usize, pages: Vec<(f64, f64, Vec<Operation>)>) -> Result<()> {
        let font_id = self.font();
        let root_id = self
            .doc
            .catalog()?
            .get(b"Pages")?
            .as_reference()
            .context("catalog has no page tree")?;

        let mut new_ids = Vec::with_capacity(pages.len());
        for (width, height, operations) in pages {
            let content = Content { operations }.encode()?;
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => root_id,
                "MediaBox" => vec![
                    Object::from(0),
                    0.into(),
                    (width as f32).into(),
                    (height as f32).into(),
                ],
                "Resources" => dictionary! {
                    "Font" => dictionary! { FONT_RESOURCE => font_id },
                },
                "Contents" => content_id,
            });
            new_ids.push(page_id);
        }

        // Where does page `at` live in the root's Kids? Kids may be page
        // tree nodes holding several pages each, so we count leaves.
        let root = self.doc.get_dictionary(root_id)?;
        let kids = root.get(b"Kids")?.as_array()?;
        let mut index = kids.len();
        let mut seen = 0;
        for (i, kid) in kids.iter().enumerate() {
            if seen >= at {
                index = i;
                break;
            }
            let kid = self.doc.get_dictionary(kid.as_reference()?)?;
            seen += match kid.get(b"Count") {
                Ok(count) => usize::try_from(count.as_i64()?).unwrap_or(0),
                Err(_) => 1,
            };
        }
        let added = new_ids.len();

        let root = self.doc.get_dictionary_mut(root_id)?;
        let kids = root.get_mut(b"Kids")?.as_array_mut()?;
        for (offset, id) in new_ids.into_iter().enumerate() {
            kids.insert(index + offset, id.into());
        }
        let count = root.get(b"Count")?.as_i64()?;
        root.set("Count", count + added as i64);

        self.pages = self.doc.get_pages().into_values().collect();
        debug!(added, at, "Inserted pages");
        Ok(())
    }
}

impl PdfEditor for LopdfEditor {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize> {
        let [x0, y0, x1, y1] = self.media_box(self.page_id(page)?)?;
        Ok(PageSize {
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    fn add_highlight(
        &mut self,
        page: usize,
        rect: Rect,
        color: Color,
        opacity: f32,
        label: &str,
    ) -> Result<()> {
        let page_id = self.page_id(page)?;
        let r = self.to_user_space(page_id, &rect)?;
        let [red, green, blue] = color.to_pdf_rgb();
        let (x0, y0, x1, y1) = (r.x0 as f32, r.y0 as f32, r.x1 as f32, r.y1 as f32);

        // Viewers that don't draw highlights themselves use this appearance.
        let appearance = vec![
            Operation::new("gs", vec!["GS0".into()]),
            Operation::new("rg", vec![red.into(), green.into(), blue.into()]),
            Operation::new(
                "re",
                vec![x0.into(), y0.into(), (x1 - x0).into(), (y1 - y0).into()],
            ),
            Operation::new("f", vec![]),
        ];
        let appearance_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![x0.into(), y0.into(), x1.into(), y1.into()],
                "Resources" => dictionary! {
                    "ExtGState" => dictionary! {
                        "GS0" => dictionary! {
                            "Type" => "ExtGState",
                            "CA" => opacity,
                            "ca" => opacity,
                            "BM" => "Multiply",
                        },
                    },
                },
            },
            Content {
                operations: appearance,
            }
            .encode()?,
        ));

        let annot_id = self.doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Highlight",
            "Rect" => vec![x0.into(), y0.into(), x1.into(), y1.into()],
            "QuadPoints" => vec![
                x0.into(), y1.into(), x1.into(), y1.into(),
                x0.into(), y0.into(), x1.into(), y0.into(),
            ],
            "C" => vec![red.into(), green.into(), blue.into()],
            "CA" => opacity,
            "F" => 4,
            "P" => page_id,
            "Contents" => Object::string_literal(encode_win_ansi(label)),
            "AP" => dictionary! { "N" => appearance_id },
        });
        self.push_annotation(page_id, annot_id)
    }

    fn add_redaction(
        &mut self,
        page: usize,
        rect: Rect,
        fill: Color,
        text: Option<&str>,
    ) -> Result<()> {
        let page_id = self.page_id(page)?;
        let rect = self.to_user_space(page_id, &rect)?;
        self.pending
            .entry(page_id)
            .or_default()
            .push(PendingRedaction {
                rect,
                fill,
                text: text.map(str::to_owned),
            });
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn apply_redactions(&mut self, page: usize) -> Result<()> {
        let page_id = self.page_id(page)?;
        let Some(redactions) = self.pending.remove(&page_id) else {
            return Ok(());
        };

        let raw = self
            .doc
            .get_page_content(page_id)
            .with_context(|| format!("could not read content of page {}", page + 1))?;
        let content = Content::decode(&raw)
            .with_context(|| format!("could not parse content of page {}", page + 1))?;
        let rects = redactions.iter().map(|r| r.rect).collect::<Vec<_>>();
        let fonts = self.font_widths(page_id);
        let (kept, removed) = strip_text(content.operations, &rects, &fonts);
        debug!(removed, redactions = redactions.len(), "Removed redacted text");

        // Isolate the original content so its graphics state can't leak into
        // what we draw on top.
        let mut operations = Vec::with_capacity(kept.len() + redactions.len() * 10 + 2);
        operations.push(Operation::new("q", vec![]));
        operations.extend(kept);
        operations.push(Operation::new("Q", vec![]));
        let mut needs_font = false;
        for redaction in &redactions {
            operations.extend(fill_rect(&redaction.rect, redaction.fill));
            if let Some(text) = &redaction.text {
                let height = redaction.rect.y1 - redaction.rect.y0;
                let font_size = (height * 0.8).clamp(1.0, 15.0);
                let baseline = redaction.rect.y0 + (height - font_size) / 2.0 + font_size * 0.2;
                let ink = if redaction.fill.is_dark() {
                    Color::WHITE
                } else {
                    Color::BLACK
                };
                operations.extend(show_text(
                    FONT_RESOURCE,
                    font_size as f32,
                    ink,
                    redaction.rect.x0 + 1.0,
                    baseline,
                    text,
                ));
                needs_font = true;
            }
        }
        if needs_font {
            self.add_font_resource(page_id)?;
        }

        let encoded = Content { operations }.encode()?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));
        self.doc
            .get_dictionary_mut(page_id)?
            .set("Contents", content_id);
        Ok(())
    }

    fn insert_text_page(&mut self, at: usize, text: &str, font_size: f32) -> Result<()> {
        let (width, height) = TEXT_PAGE_SIZE;
        let line_height = f64::from(font_size) * 1.2;
        let lines_per_page =
            (((height - 2.0 * TEXT_PAGE_MARGIN) / line_height).floor() as usize).max(1);
        let lines = text.lines().collect::<Vec<_>>();
        let pages = lines
            .chunks(lines_per_page)
            .map(|chunk| {
                let operations = chunk
                    .iter()
                    .enumerate()
                    .flat_map(|(i, line)| {
                        show_text(
                            FONT_RESOURCE,
                            font_size,
                            Color::BLACK,
                            TEXT_PAGE_MARGIN,
                            height - TEXT_PAGE_MARGIN - (i as f64 + 1.0) * line_height,
                            line,
                        )
                    })
                    .collect();
                (width, height, operations)
            })
            .collect::<Vec<_>>();
        self.insert_pages(at, pages)
    }

    fn insert_legend_page(&mut self, at: usize, entries: &[(String, Color)]) -> Result<()> {
        let (width, height) = LEGEND_PAGE_SIZE;
        let (cell_w, cell_h) = LEGEND_CELL;
        let cols = (width / cell_w) as usize;
        let rows = (height / cell_h) as usize;
        let line_height = f64::from(LEGEND_FONT_SIZE) * 1.2;

        let pages = entries
            .chunks(cols * rows)
            .map(|chunk| {
                let mut operations = vec![];
                for (i, (label, color)) in chunk.iter().enumerate() {
                    let x0 = (i % cols) as f64 * cell_w;
                    let top = height - (i / cols) as f64 * cell_h;
                    let swatch = UserRect {
                        x0,
                        y0: top - cell_h,
                        x1: x0 + cell_w,
                        y1: top,
                    };
                    operations.extend(fill_rect(&swatch, *color));
                    // Label twice, once in white and once in black, so it
                    // reads on any swatch.
                    let baseline = top - cell_h * 0.3;
                    for (ink, y) in [
                        (Color::WHITE, baseline),
                        (Color::BLACK, baseline - line_height),
                    ] {
                        operations.extend(show_text(
                            FONT_RESOURCE,
                            LEGEND_FONT_SIZE,
                            ink,
                            x0 + 2.0,
                            y,
                            label,
                        ));
                    }
                }
                (width, height, operations)
            })
            .collect::<Vec<_>>();
        self.insert_pages(at, pages)
    }

    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    fn save(&mut self, path: &Path) -> Result<()> {
        if !self.pending.is_empty() {
            warn!(
                pages = self.pending.len(),
                "Saving with redactions that were never applied"
            );
        }
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_owned(),
            _ => PathBuf::from("."),
        };
        let tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("could not create temporary file in {:?}", dir.display()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            self.doc
                .save_to(&mut writer)
                .with_context(|| format!("could not write PDF {:?}", path.display()))?;
            std::io::Write::flush(&mut writer)?;
        }
        tmp.persist(path)
            .with_context(|| format!("could not save PDF to {:?}", path.display()))?;
        if let Ok(metadata) = fs::metadata(path) {
            debug!(bytes = metadata.len(), "Saved PDF");
        }
        Ok(())
    }
}

/// Follow references until we reach a direct object.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    doc.dereference(object).ok().map(|(_, object)| object)
}
