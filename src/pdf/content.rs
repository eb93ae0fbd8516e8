//! Content stream rewriting for redactions.
//!
//! We track just enough graphics and text state to know where each glyph is
//! drawn. When the current font has a `/Widths` table, glyphs whose center
//! falls inside a redaction are cut out of their run and replaced with an
//! equal-width `TJ` adjustment, so the rest of the line stays put. Without
//! widths we only know where a run starts: a run starting inside a redaction
//! is dropped whole, and later runs are kept until the next positioning
//! operator tells us where we are again.

use std::collections::BTreeMap;

use lopdf::{Object, content::Operation};

use crate::color::Color;

/// A rectangle in PDF user space (origin at the bottom left).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UserRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl UserRect {
    fn contains(&self, (x, y): (f64, f64)) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

/// Glyph widths of a simple font, in thousandths of a text space unit.
#[derive(Clone, Debug, PartialEq)]
pub struct FontWidths {
    pub first_char: u32,
    pub widths: Vec<f64>,
    pub missing_width: f64,
}

impl FontWidths {
    fn width(&self, code: u8) -> f64 {
        u32::from(code)
            .checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .unwrap_or(self.missing_width)
    }
}

/// Widths for each font resource on a page, keyed by resource name.
pub type FontTable = BTreeMap<Vec<u8>, FontWidths>;

/// An affine transform `[a b c d e f]`, as used by `cm` and `Tm`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f64, ty: f64) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` followed by `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn origin(&self) -> (f64, f64) {
        (self.0[4], self.0[5])
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f64; N]> {
    if operands.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = f64::from(operand.as_float().ok()?);
    }
    Some(out)
}

/// Text state parameters. These belong to the graphics state, so `q` and `Q`
/// save and restore them.
#[derive(Clone, Debug)]
struct TextParams {
    font: Option<Vec<u8>>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    scaling: f64,
    leading: f64,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            scaling: 1.0,
            leading: 0.0,
        }
    }
}

#[derive(Debug)]
struct TextState {
    ctm: Matrix,
    params: TextParams,
    stack: Vec<(Matrix, TextParams)>,
    line: Matrix,
    text: Matrix,
    /// False once we've shown text we couldn't measure.
    positioned: bool,
}

/// What to do with a text-showing operator.
enum Show {
    Keep,
    Drop,
    /// Show these `TJ` elements instead.
    Replace(Vec<Object>),
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            params: TextParams::default(),
            stack: vec![],
            line: Matrix::IDENTITY,
            text: Matrix::IDENTITY,
            positioned: true,
        }
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.line = Matrix::translate(tx, ty).then(&self.line);
        self.text = self.line;
        self.positioned = true;
    }

    /// A point `dx` along the baseline from the current position, in user
    /// space.
    fn point_at(&self, dx: f64) -> (f64, f64) {
        Matrix::translate(dx, 0.0)
            .then(&self.text)
            .then(&self.ctm)
            .origin()
    }

    fn advance(&mut self, tx: f64) {
        self.text = Matrix::translate(tx, 0.0).then(&self.text);
    }

    /// How far a glyph moves the text position, in unscaled text space.
    fn glyph_advance(&self, width: f64, code: u8) -> f64 {
        let word_spacing = if code == b' ' {
            self.params.word_spacing
        } else {
            0.0
        };
        (width / 1000.0 * self.params.size + self.params.char_spacing + word_spacing)
            * self.params.scaling
    }

    /// Work out which glyphs of a run to keep, and move past the run.
    fn show(&mut self, elements: &[Object], rects: &[UserRect], fonts: &FontTable) -> Show {
        if !self.positioned {
            return Show::Keep;
        }
        let in_rects = |point: (f64, f64)| rects.iter().any(|r| r.contains(point));
        let scale = self.params.size * self.params.scaling;
        let widths = self
            .params
            .font
            .as_ref()
            .and_then(|font| fonts.get(font))
            .filter(|_| scale != 0.0);
        let Some(widths) = widths else {
            let inside = in_rects(self.point_at(0.0));
            self.positioned = false;
            return if inside { Show::Drop } else { Show::Keep };
        };

        let mut out = vec![];
        let mut kept = vec![];
        let mut removed = false;
        for element in elements {
            if let Object::String(bytes, _) = element {
                for &code in bytes {
                    let advance = self.glyph_advance(widths.width(code), code);
                    if in_rects(self.point_at(advance / 2.0)) {
                        removed = true;
                        flush_text(&mut out, &mut kept);
                        push_adjustment(&mut out, -advance * 1000.0 / scale);
                    } else {
                        kept.push(code);
                    }
                    self.advance(advance);
                }
            } else if let Ok(adjustment) = element.as_float() {
                let adjustment = f64::from(adjustment);
                flush_text(&mut out, &mut kept);
                push_adjustment(&mut out, adjustment);
                self.advance(-adjustment / 1000.0 * scale);
            }
        }
        flush_text(&mut out, &mut kept);
        if removed {
            Show::Replace(out)
        } else {
            Show::Keep
        }
    }
}

fn flush_text(out: &mut Vec<Object>, kept: &mut Vec<u8>) {
    if !kept.is_empty() {
        out.push(Object::string_literal(std::mem::take(kept)));
    }
}

fn push_adjustment(out: &mut Vec<Object>, adjustment: f64) {
    if let Some(Object::Real(last)) = out.last_mut() {
        *last += adjustment as f32;
    } else {
        out.push(Object::Real(adjustment as f32));
    }
}

/// Remove text drawn inside any of `rects`.
///
/// Returns the rewritten operations and how many text-showing operators lost
/// some or all of their text.
pub fn strip_text(
    operations: Vec<Operation>,
    rects: &[UserRect],
    fonts: &FontTable,
) -> (Vec<Operation>, usize) {
    let mut state = TextState::new();
    let mut removed = 0;
    let mut out = Vec::with_capacity(operations.len());
    for op in operations {
        match op.operator.as_str() {
            "q" => state.stack.push((state.ctm, state.params.clone())),
            "Q" => {
                if let Some((ctm, params)) = state.stack.pop() {
                    state.ctm = ctm;
                    state.params = params;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(&op.operands) {
                    state.ctm = Matrix(m).then(&state.ctm);
                }
            }
            "BT" => {
                state.line = Matrix::IDENTITY;
                state.text = Matrix::IDENTITY;
                state.positioned = true;
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(&op.operands) {
                    state.line = Matrix(m);
                    state.text = state.line;
                    state.positioned = true;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(&op.operands) {
                    state.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(&op.operands) {
                    state.params.leading = -ty;
                    state.next_line(tx, ty);
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(&op.operands) {
                    state.params.leading = leading;
                }
            }
            "Tc" => {
                if let Some([spacing]) = numbers::<1>(&op.operands) {
                    state.params.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some([spacing]) = numbers::<1>(&op.operands) {
                    state.params.word_spacing = spacing;
                }
            }
            "Tz" => {
                if let Some([scaling]) = numbers::<1>(&op.operands) {
                    state.params.scaling = scaling / 100.0;
                }
            }
            "Tf" => {
                if let [name, size] = op.operands.as_slice() {
                    state.params.font = name.as_name().ok().map(<[u8]>::to_vec);
                    state.params.size = size.as_float().map(f64::from).unwrap_or(0.0);
                }
            }
            "T*" => state.next_line(0.0, -state.params.leading),
            "'" | "\"" => {
                let mut prefix = vec![];
                if op.operator == "\"" {
                    if let [word_spacing, char_spacing, _] = op.operands.as_slice() {
                        state.params.word_spacing =
                            word_spacing.as_float().map(f64::from).unwrap_or(0.0);
                        state.params.char_spacing =
                            char_spacing.as_float().map(f64::from).unwrap_or(0.0);
                        prefix.push(Operation::new("Tw", vec![word_spacing.clone()]));
                        prefix.push(Operation::new("Tc", vec![char_spacing.clone()]));
                    }
                }
                state.next_line(0.0, -state.params.leading);
                let shown = op.operands.last().cloned().into_iter().collect::<Vec<_>>();
                match state.show(&shown, rects, fonts) {
                    Show::Keep => {}
                    show => {
                        removed += 1;
                        out.extend(prefix);
                        // Keep the line advance, drop the text.
                        out.push(Operation::new("T*", vec![]));
                        if let Show::Replace(elements) = show {
                            out.push(Operation::new("TJ", vec![Object::Array(elements)]));
                        }
                        continue;
                    }
                }
            }
            "Tj" | "TJ" => {
                let shown = match op.operands.first() {
                    Some(Object::Array(elements)) => elements.clone(),
                    Some(string) => vec![string.clone()],
                    None => vec![],
                };
                match state.show(&shown, rects, fonts) {
                    Show::Keep => {}
                    Show::Drop => {
                        removed += 1;
                        continue;
                    }
                    Show::Replace(elements) => {
                        removed += 1;
                        out.push(Operation::new("TJ", vec![Object::Array(elements)]));
                        continue;
                    }
                }
            }
            _ => {}
        }
        out.push(op);
    }
    (out, removed)
}

/// Operations to fill `rect` with `color`.
pub fn fill_rect(rect: &UserRect, color: Color) -> Vec<Operation> {
    let [r, g, b] = color.to_pdf_rgb();
    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![r.into(), g.into(), b.into()]),
        Operation::new(
            "re",
            vec![
                (rect.x0 as f32).into(),
                (rect.y0 as f32).into(),
                ((rect.x1 - rect.x0) as f32).into(),
                ((rect.y1 - rect.y0) as f32).into(),
            ],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Operations to draw one line of text with its baseline at `(x, y)`.
pub fn show_text(
    font: &str,
    font_size: f32,
    color: Color,
    x: f64,
    y: f64,
    text: &str,
) -> Vec<Operation> {
    let [r, g, b] = color.to_pdf_rgb();
    vec![
        Operation::new("BT", vec![]),
        Operation::new("rg", vec![r.into(), g.into(), b.into()]),
        Operation::new("Tf", vec![font.into(), font_size.into()]),
        Operation::new("Td", vec![(x as f32).into(), (y as f32).into()]),
        Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]),
        Operation::new("ET", vec![]),
    ]
}

/// Encode text for a standard 14 font. Characters outside Latin-1 become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u8::try_from(u32::from(c)) {
            Ok(byte) if byte >= 0x20 => byte,
            _ => b'?',
        })
        .collect()
}
