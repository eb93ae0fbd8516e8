//! Synthetic replacement text for redact-and-replace.

use std::{collections::BTreeMap, fmt, str::FromStr};

use fake::{
    Fake,
    faker::{
        address::en::{BuildingNumber, CityName, StateAbbr, StreetName, ZipCode},
        company::en::CompanyName,
        currency::en::CurrencyCode,
        internet::en::SafeEmail,
        lorem::en::Words,
        name::en::{FirstName, LastName, Name},
        number::en::NumberWithFormat,
        phone_number::en::PhoneNumber,
    },
};
use rand::Rng;
use schemars::JsonSchema;

use crate::{errors::HighlightError, prelude::*};

/// The kind of fake data to draw over a redacted label.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillCategory {
    /// A full personal name.
    Name,
    FirstName,
    LastName,
    /// A calendar date, formatted as `YYYY-MM-DD`.
    Date,
    /// Random digits, as many as the original text had characters.
    Numerify,
    /// Lorem ipsum text, as long as the original text.
    Text,
    Company,
    /// A one-line US street address.
    Address,
    #[serde(alias = "company_email")]
    Email,
    PhoneNumber,
    /// A currency code.
    Currency,
}

impl FillCategory {
    /// Every category, in display order.
    pub const ALL: &[FillCategory] = &[
        FillCategory::Name,
        FillCategory::FirstName,
        FillCategory::LastName,
        FillCategory::Date,
        FillCategory::Numerify,
        FillCategory::Text,
        FillCategory::Company,
        FillCategory::Address,
        FillCategory::Email,
        FillCategory::PhoneNumber,
        FillCategory::Currency,
    ];

    fn as_str(self) -> &'static str {
        match self {
            FillCategory::Name => "name",
            FillCategory::FirstName => "first_name",
            FillCategory::LastName => "last_name",
            FillCategory::Date => "date",
            FillCategory::Numerify => "numerify",
            FillCategory::Text => "text",
            FillCategory::Company => "company",
            FillCategory::Address => "address",
            FillCategory::Email => "email",
            FillCategory::PhoneNumber => "phone_number",
            FillCategory::Currency => "currency",
        }
    }

    /// Generate replacement text for an original text `len` characters long.
    pub fn generate<R: Rng + ?Sized>(self, len: usize, rng: &mut R) -> String {
        match self {
            FillCategory::Name => Name().fake_with_rng(rng),
            FillCategory::FirstName => FirstName().fake_with_rng(rng),
            FillCategory::LastName => LastName().fake_with_rng(rng),
            FillCategory::Date => format!(
                "{:04}-{:02}-{:02}",
                rng.random_range(1970..=2030),
                rng.random_range(1..=12),
                rng.random_range(1..=28),
            ),
            FillCategory::Numerify => NumberWithFormat(&"#".repeat(len)).fake_with_rng(rng),
            FillCategory::Text => lorem_of_len(len, rng),
            FillCategory::Company => CompanyName().fake_with_rng(rng),
            FillCategory::Address => {
                let number: String = BuildingNumber().fake_with_rng(rng);
                let street: String = StreetName().fake_with_rng(rng);
                let city: String = CityName().fake_with_rng(rng);
                let state: String = StateAbbr().fake_with_rng(rng);
                let zip: String = ZipCode().fake_with_rng(rng);
                format!("{} {}, {}, {} {}", number, street, city, state, zip)
            }
            FillCategory::Email => SafeEmail().fake_with_rng(rng),
            FillCategory::PhoneNumber => PhoneNumber().fake_with_rng(rng),
            FillCategory::Currency => CurrencyCode().fake_with_rng(rng),
        }
    }
}

impl fmt::Display for FillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FillCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "company_email" {
            return Ok(FillCategory::Email);
        }
        FillCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                let known = FillCategory::ALL
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow!("unknown fill category {:?} (expected one of {})", s, known)
            })
    }
}

/// Lorem ipsum words, cut to exactly `len` characters.
fn lorem_of_len<R: Rng + ?Sized>(len: usize, rng: &mut R) -> String {
    let mut text = String::new();
    while text.chars().count() < len {
        let words: Vec<String> = Words(3..8).fake_with_rng(rng);
        for word in words {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&word);
        }
    }
    text.chars().take(len).collect()
}

/// Which fill category to use for each label.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FillRules {
    rules: BTreeMap<String, FillCategory>,
}

impl FillRules {
    pub fn new(rules: BTreeMap<String, FillCategory>) -> Self {
        Self { rules }
    }

    /// The category for `label`. Every label we replace must have a rule.
    pub fn category_for(&self, label: &str) -> Result<FillCategory, HighlightError> {
        self.rules
            .get(label)
            .copied()
            .ok_or_else(|| HighlightError::MissingFillRule {
                label: label.to_owned(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn numerify_matches_length() {
        let mut rng = StdRng::seed_from_u64(7);
        let text = FillCategory::Numerify.generate(12, &mut rng);
        assert_eq!(text.len(), 12);
        assert!(text.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn text_matches_length() {
        let mut rng = StdRng::seed_from_u64(7);
        for len in [0, 1, 5, 25, 200] {
            let text = FillCategory::Text.generate(len, &mut rng);
            assert_eq!(text.chars().count(), len);
        }
    }

    #[test]
    fn every_category_generates_something() {
        let mut rng = StdRng::seed_from_u64(42);
        for category in FillCategory::ALL {
            let text = category.generate(8, &mut rng);
            assert!(!text.is_empty(), "{} generated nothing", category);
        }
    }

    #[test]
    fn generation_is_reproducible_with_a_seed() {
        let generate = || {
            let mut rng = StdRng::seed_from_u64(1234);
            FillCategory::ALL
                .iter()
                .map(|c| c.generate(10, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(generate(), generate());
    }

    #[test]
    fn dates_look_like_dates() {
        let mut rng = StdRng::seed_from_u64(3);
        let date = FillCategory::Date.generate(0, &mut rng);
        let parts = date.split('-').collect::<Vec<_>>();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4);
    }

    #[test]
    fn categories_parse_and_display() {
        for category in FillCategory::ALL {
            assert_eq!(category.to_string().parse::<FillCategory>().unwrap(), *category);
        }
        assert_eq!(
            "company_email".parse::<FillCategory>().unwrap(),
            FillCategory::Email
        );
        let rule: FillCategory = serde_json::from_value(json!("company_email")).unwrap();
        assert_eq!(rule, FillCategory::Email);
        assert!("ssn".parse::<FillCategory>().is_err());
    }

    #[test]
    fn missing_rules_are_reported_by_label() {
        let mut rules = BTreeMap::new();
        rules.insert("member".to_owned(), FillCategory::Name);
        let rules = FillRules::new(rules);
        assert_eq!(rules.category_for("member").unwrap(), FillCategory::Name);
        assert_eq!(
            rules.category_for("birthday"),
            Err(HighlightError::MissingFillRule {
                label: "birthday".to_owned()
            })
        );
    }
}
