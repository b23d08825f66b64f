//! Release tag selection for the primary project.
//!
//! Releases are tagged `<prefix>-YYYY-MM` (for Odin, `dev-2024-12`). Ordering
//! is numeric on `(year, month)`, never lexical on the raw tag.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Default prefix of monthly release tags.
pub const DEFAULT_TAG_PREFIX: &str = "dev";

/// How strictly the month component is validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPolicy {
    /// Month must be `01`..=`12`.
    #[default]
    Strict,
    /// Any two digits are accepted as a month, so `dev-2024-13` is a tag.
    DigitsOnly,
}

/// A parsed release tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub raw: String,
    pub year: u16,
    pub month: u8,
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.year, self.month).cmp(&(other.year, other.month))
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Picks the newest release tag out of a `git tag -l` listing.
#[derive(Debug, Clone)]
pub struct TagSelector {
    prefix: String,
    pattern: Regex,
    policy: TagPolicy,
}

impl Default for TagSelector {
    fn default() -> Self {
        Self::new(DEFAULT_TAG_PREFIX, TagPolicy::default())
    }
}

impl TagSelector {
    pub fn new(prefix: &str, policy: TagPolicy) -> Self {
        let pattern = Regex::new(&format!(r"^{}-(\d{{4}})-(\d{{2}})$", regex::escape(prefix)))
            .expect("escaped tag pattern is a valid regex");
        Self {
            prefix: prefix.to_string(),
            pattern,
            policy,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parse one line of tag output; `None` if it does not follow the
    /// convention.
    pub fn parse(&self, line: &str) -> Option<Tag> {
        let line = line.trim();
        let caps = self.pattern.captures(line)?;
        let year: u16 = caps[1].parse().ok()?;
        let month: u8 = caps[2].parse().ok()?;

        if self.policy == TagPolicy::Strict && !(1..=12).contains(&month) {
            return None;
        }

        Some(Tag {
            raw: line.to_string(),
            year,
            month,
        })
    }

    /// Greatest tag by `(year, month)`, or `None` if nothing matches.
    pub fn latest_tag<I, S>(&self, lines: I) -> Option<Tag>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter_map(|line| self.parse(line.as_ref()))
            .max()
    }
}
