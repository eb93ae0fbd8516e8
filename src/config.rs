//! Optional configuration file.
//!
//! Colors and fill rules are per-project settings, so they live in a TOML (or
//! JSON) file passed with `--config`:
//!
//! ```toml
//! default_color = "yellow"
//! redact_fill = "black"
//! offset_mode = "document"
//!
//! [colors]
//! Vendor = "lightblue"
//! Total = "#ff8800"
//!
//! [fill_rules]
//! Vendor = "company"
//! Total = "currency"
//! ```
//!
//! Command-line flags override values from the file.

use std::collections::BTreeMap;

use schemars::JsonSchema;

use crate::{
    async_utils::io::read_json_or_toml,
    color::{Color, ColorMap},
    fill::{FillCategory, FillRules},
    predictions::OffsetMode,
    prelude::*,
};

/// Per-project settings.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Highlight color for labels without an entry in `colors`. Defaults to
    /// yellow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub default_color: Option<Color>,

    /// Highlight color for each label, as a color name or `#rrggbb`.
    #[serde(default)]
    #[schemars(with = "BTreeMap<String, String>")]
    pub colors: BTreeMap<String, Color>,

    /// Which kind of fake data replaces each label.
    #[serde(default)]
    pub fill_rules: BTreeMap<String, FillCategory>,

    /// Fill color for plain redactions. Defaults to black.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub redact_fill: Option<Color>,

    /// Which text prediction offsets point into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_mode: Option<OffsetMode>,
}

impl Config {
    /// Load a config file.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn from_path(path: &Path) -> Result<Self> {
        read_json_or_toml(path)
            .await
            .with_context(|| format!("invalid config file {:?}", path))
    }

    /// Load a config file if we have one, or use defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path).await,
            None => Ok(Self::default()),
        }
    }

    /// Label colors, with `default_override` taking precedence over the
    /// file's default.
    pub fn color_map(&self, default_override: Option<Color>) -> ColorMap {
        let default = default_override
            .or(self.default_color)
            .unwrap_or(Color::YELLOW);
        ColorMap::new(default, self.colors.clone())
    }

    pub fn fill_rules(&self) -> FillRules {
        FillRules::new(self.fill_rules.clone())
    }

    /// The redaction fill, unless `white` asks for white.
    pub fn redact_fill(&self, white: bool) -> Color {
        if white {
            Color::WHITE
        } else {
            self.redact_fill.unwrap_or(Color::BLACK)
        }
    }

    /// The offset mode, with `mode_override` taking precedence.
    pub fn offset_mode(&self, mode_override: Option<OffsetMode>) -> OffsetMode {
        mode_override.or(self.offset_mode).unwrap_or_default()
    }
}
