//! Error kinds produced by the alignment core.
//!
//! Application code generally works with [`anyhow::Error`], but these errors
//! are kept typed so callers (and tests) can tell them apart with
//! [`anyhow::Error::downcast_ref`].

use thiserror::Error;

/// Errors raised while aligning predictions or producing output from them.
#[derive(Debug, Error, PartialEq)]
pub enum HighlightError {
    /// The OCR or prediction data was malformed, for example a token was
    /// missing the offsets needed for the selected offset mode.
    #[error("invalid alignment input: {0}")]
    AlignmentInput(String),

    /// A position needed a label, but did not have one. This means the
    /// position data was built incorrectly, so we refuse to guess.
    #[error("position on page {page} has no label, but every position must have one")]
    MissingLabel {
        /// The 0-based page index of the offending position.
        page: usize,
    },

    /// Redact-and-replace found a label with no fill rule.
    #[error("no fill rule for label {label:?}; add it to your fill rules")]
    MissingFillRule {
        /// The label that had no fill rule.
        label: String,
    },

    /// An OCR confidence metric we don't know how to compute.
    #[error("unsupported OCR confidence metric {0:?} (supported: mean, median)")]
    UnsupportedMetric(String),

    /// The OCR data doesn't contain what we need.
    #[error("unsupported OCR data: {0}")]
    UnsupportedData(String),
}
