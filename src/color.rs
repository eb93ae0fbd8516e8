//! Colors, and the mapping from labels to highlight colors.

use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::prelude::*;

/// Named colors we understand, as 8-bit RGB.
const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("blue", [0, 0, 255]),
    ("brown", [165, 42, 42]),
    ("cyan", [0, 255, 255]),
    ("gold", [255, 215, 0]),
    ("gray", [128, 128, 128]),
    ("green", [0, 128, 0]),
    ("grey", [128, 128, 128]),
    ("lightblue", [173, 216, 230]),
    ("lightgreen", [144, 238, 144]),
    ("lightgray", [211, 211, 211]),
    ("lime", [0, 255, 0]),
    ("magenta", [255, 0, 255]),
    ("orange", [255, 165, 0]),
    ("pink", [255, 192, 203]),
    ("purple", [128, 0, 128]),
    ("red", [255, 0, 0]),
    ("salmon", [250, 128, 114]),
    ("skyblue", [135, 206, 235]),
    ("tan", [210, 180, 140]),
    ("turquoise", [64, 224, 208]),
    ("violet", [238, 130, 238]),
    ("white", [255, 255, 255]),
    ("yellow", [255, 255, 0]),
];

/// An RGB color.
///
/// Parsed from a color name (`"yellow"`) or a hex string (`"#ffcc00"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };
    pub const YELLOW: Color = Color { r: 255, g: 255, b: 0 };

    /// Components in the 0-1 range used by PDF color operators.
    pub fn to_pdf_rgb(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }

    /// Is this color dark enough that black text on it is hard to read?
    pub fn is_dark(self) -> bool {
        let luma =
            0.299 * f64::from(self.r) + 0.587 * f64::from(self.g) + 0.114 * f64::from(self.b);
        luma < 128.0
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(anyhow!("expected a color like #ffcc00, found {:?}", s));
            }
            let component = |range: std::ops::Range<usize>| {
                u8::from_str_radix(&hex[range], 16)
                    .with_context(|| format!("invalid hex color {:?}", s))
            };
            return Ok(Color {
                r: component(0..2)?,
                g: component(2..4)?,
                b: component(4..6)?,
            });
        }
        let name = s.to_ascii_lowercase().replace([' ', '_', '-'], "");
        NAMED_COLORS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, [r, g, b])| Color {
                r: *r,
                g: *g,
                b: *b,
            })
            .ok_or_else(|| anyhow!("unknown color {:?}", s))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rgb = [self.r, self.g, self.b];
        match NAMED_COLORS.iter().find(|(_, c)| *c == rgb) {
            Some((name, _)) => write!(f, "{}", name),
            None => write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

/// Which color to use for each label.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorMap {
    default: Color,
    colors: BTreeMap<String, Color>,
}

impl ColorMap {
    pub fn new(default: Color, colors: BTreeMap<String, Color>) -> Self {
        Self { default, colors }
    }

    /// The color for `label`, falling back to the default.
    pub fn color_for(&self, label: &str) -> Color {
        self.colors.get(label).copied().unwrap_or(self.default)
    }

    pub fn default_color(&self) -> Color {
        self.default
    }

    /// Legend entries for `labels`, sorted by label name.
    pub fn legend<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> Vec<(String, Color)> {
        let mut labels = labels.into_iter().collect::<Vec<_>>();
        labels.sort_unstable();
        labels.dedup();
        labels
            .into_iter()
            .map(|label| (label.to_owned(), self.color_for(label)))
            .collect()
    }
}

impl Default for ColorMap {
    fn default() -> Self {
        Self::new(Color::YELLOW, BTreeMap::new())
    }
}
