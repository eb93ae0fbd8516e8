//! Rectangles in PDF point space.

use crate::{ocr::BoundingBox, ocr::PageSize, prelude::*};

/// A rectangle in PDF points, measured from the top left of the page.
///
/// PDF user space has its origin at the bottom left, but OCR boxes are
/// measured from the top. We keep the OCR orientation here and let the PDF
/// editor flip it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Grow the rectangle by `ratio` of its height on every side.
    ///
    /// OCR boxes are tight around the glyphs, which can leave descenders and
    /// accents peeking out from under a redaction.
    pub fn inflate(&self, ratio: f64) -> Rect {
        let pad = self.height() * ratio;
        Rect {
            x0: self.x0 - pad,
            y0: self.y0 - pad,
            x1: self.x1 + pad,
            y1: self.y1 + pad,
        }
    }
}

/// Converts OCR raster coordinates into PDF points for one page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    /// The scale from an OCR image of `ocr` pixels to a PDF page of `pdf`
    /// points.
    pub fn new(pdf: PageSize, ocr: PageSize) -> Result<Self> {
        if ocr.width <= 0.0 || ocr.height <= 0.0 {
            return Err(anyhow!(
                "OCR page size {}x{} is not usable for scaling",
                ocr.width,
                ocr.height
            ));
        }
        Ok(Self {
            x: pdf.width / ocr.width,
            y: pdf.height / ocr.height,
        })
    }

    /// Scale an OCR box into a PDF rectangle.
    pub fn apply(&self, bbox: &BoundingBox) -> Rect {
        Rect {
            x0: bbox.left * self.x,
            y0: bbox.top * self.y,
            x1: bbox.right * self.x,
            y1: bbox.bottom * self.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter() -> PageSize {
        PageSize {
            width: 612.0,
            height: 792.0,
        }
    }

    #[test]
    fn scales_ocr_pixels_to_points() {
        let scale = Scale::new(
            letter(),
            PageSize {
                width: 2550.0,
                height: 3300.0,
            },
        )
        .unwrap();
        assert!((scale.x - 0.24).abs() < 1e-9);
        assert!((scale.y - 0.24).abs() < 1e-9);

        let rect = scale.apply(&BoundingBox {
            left: 1070.0,
            top: 282.0,
            right: 1878.0,
            bottom: 342.0,
        });
        assert!((rect.x0 - 256.8).abs() < 1e-9);
        assert!((rect.y0 - 67.68).abs() < 1e-9);
        assert!((rect.x1 - 450.72).abs() < 1e-9);
        assert!((rect.y1 - 82.08).abs() < 1e-9);
    }

    #[test]
    fn zero_sized_ocr_pages_are_rejected() {
        let ocr = PageSize {
            width: 0.0,
            height: 3300.0,
        };
        assert!(Scale::new(letter(), ocr).is_err());
    }

    #[test]
    fn inflation_grows_height_by_a_fifth_around_the_center() {
        let rect = Rect {
            x0: 100.0,
            y0: 50.0,
            x1: 200.0,
            y1: 60.0,
        };
        let inflated = rect.inflate(0.1);
        assert!((inflated.height() - rect.height() * 1.2).abs() < 1e-9);
        assert!((inflated.width() - (rect.width() + 2.0)).abs() < 1e-9);
        let center = |r: &Rect| ((r.x0 + r.x1) / 2.0, (r.y0 + r.y1) / 2.0);
        assert_eq!(center(&inflated), center(&rect));
    }
}
