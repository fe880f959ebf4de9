use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A contract's slug identifier, e.g. `client_tier_segmentation`.
///
/// Always lowercase ASCII, normalized on construction so comparisons and
/// file paths never have to re-normalize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(String);

impl ContractId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Transliterate an arbitrary (possibly non-ASCII) metric name into a
    /// slug: lowercase ASCII, `_`-separated, length-capped.
    pub fn slugify(name: &str, max_len: usize) -> Self {
        let mut out = String::new();
        let mut last_was_sep = true;
        for ch in name.chars() {
            let mapped = transliterate_char(ch);
            for c in mapped.chars() {
                if c.is_ascii_alphanumeric() {
                    out.push(c.to_ascii_lowercase());
                    last_was_sep = false;
                } else if !last_was_sep {
                    out.push('_');
                    last_was_sep = true;
                }
            }
        }
        while out.ends_with('_') {
            out.pop();
        }
        out.truncate(max_len);
        while out.ends_with('_') {
            out.pop();
        }
        Self(out)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContractId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ContractId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Minimal Cyrillic -> Latin transliteration table, used only for slug
/// generation (not for display). Unknown characters pass through and are
/// then filtered by the caller's alphanumeric check.
fn transliterate_char(c: char) -> &'static str {
    match c.to_ascii_lowercase() {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' | 'й' => "i",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        other => {
            if other.is_ascii_alphanumeric() {
                // leak a 'static str for the single ascii char; cheap table covers a-z0-9
                ascii_char_str(other)
            } else {
                " "
            }
        }
    }
}

fn ascii_char_str(c: char) -> &'static str {
    const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";
    if let Some(idx) = ALPHABET.find(c) {
        &ALPHABET[idx..idx + 1]
    } else {
        " "
    }
}

/// A chat participant's username, case-normalized to lowercase with any
/// leading `@` stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().trim_start_matches('@').to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn mention(&self) -> String {
        format!("@{}", self.0)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Username {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Governance tier, ordered from least to most scrutiny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    pub const DEFAULT: Tier = Tier::Tier2;

    pub fn as_key(&self) -> &'static str {
        match self {
            Tier::Tier1 => "tier_1",
            Tier::Tier2 => "tier_2",
            Tier::Tier3 => "tier_3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

impl FromStr for Tier {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tier_1" => Ok(Tier::Tier1),
            "tier_2" => Ok(Tier::Tier2),
            "tier_3" => Ok(Tier::Tier3),
            other => Err(CoreError::InvalidTier(other.to_string())),
        }
    }
}

/// Contract lifecycle status (§3 Data Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Draft,
    InReview,
    Agreed,
    Approved,
    Active,
    Deprecated,
    Archived,
}

impl LifecycleStatus {
    pub fn as_key(&self) -> &'static str {
        match self {
            LifecycleStatus::Draft => "draft",
            LifecycleStatus::InReview => "in_review",
            LifecycleStatus::Agreed => "agreed",
            LifecycleStatus::Approved => "approved",
            LifecycleStatus::Active => "active",
            LifecycleStatus::Deprecated => "deprecated",
            LifecycleStatus::Archived => "archived",
        }
    }

    /// Statuses that count as "already being worked on" for suggestion and
    /// coverage-scan dedup purposes.
    pub fn is_active_ish(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::Draft
                | LifecycleStatus::InReview
                | LifecycleStatus::Approved
                | LifecycleStatus::Active
                | LifecycleStatus::Agreed
        )
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

impl FromStr for LifecycleStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(LifecycleStatus::Draft),
            "in_review" => Ok(LifecycleStatus::InReview),
            "agreed" => Ok(LifecycleStatus::Agreed),
            "approved" => Ok(LifecycleStatus::Approved),
            "active" => Ok(LifecycleStatus::Active),
            "deprecated" => Ok(LifecycleStatus::Deprecated),
            "archived" => Ok(LifecycleStatus::Archived),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Which model tier a router decision or scheduler task should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Cheap,
    Heavy,
}

/// The chat surface a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Channel,
    Dm,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_transliterates_and_caps_length() {
        let id = ContractId::slugify("Доля активаций MAU", 12);
        assert_eq!(id.as_str(), "dolya_aktiv");
    }

    #[test]
    fn username_normalizes_mention() {
        let u = Username::new("@PavelPetrin");
        assert_eq!(u.as_str(), "pavelpetrin");
        assert_eq!(u.mention(), "@pavelpetrin");
    }

    #[test]
    fn tier_round_trips() {
        for t in [Tier::Tier1, Tier::Tier2, Tier::Tier3] {
            assert_eq!(t.as_key().parse::<Tier>().unwrap(), t);
        }
    }
}
