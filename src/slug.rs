//! Slug computation and historical slug resolution
//!
//! Slugs are the URL-safe identifiers of contents, containers and extracts.
//! A node is addressed by the ordered path of slugs from the root, so slug
//! computation must be deterministic and collision-free among siblings.
//!
//! Two distinct lookup mechanisms exist and are kept separate:
//! - sibling dedup at slugify time (numeric suffix on collision);
//! - top-level slug history, so a renamed content keeps resolving under
//!   its previous slugs.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters allowed in a slug after normalization
const SLUG_KEEP_PATTERN: &str = r"[^a-z0-9\s_-]";

/// Transliterate one character to its ASCII approximation
///
/// Covers the latin-1 supplement plus the ligatures the platform's content
/// actually uses. Anything else non-ASCII is dropped by the keep pattern.
fn transliterate(c: char) -> &'static str {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ç' => "c",
        'ñ' => "n",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        'ð' => "d",
        'þ' => "th",
        _ => "",
    }
}

/// Compute a slug from a title
///
/// Lower-cases, transliterates accented latin characters, strips everything
/// that is not a letter, digit, space, underscore or hyphen, collapses
/// separator runs into single hyphens and truncates to `max_length` bytes.
///
/// Returns `None` when the title normalizes to an empty string (e.g. a title
/// made only of punctuation).
pub fn slugify(title: &str, max_length: usize) -> Option<String> {
    let lowered = title.to_lowercase();

    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_ascii() {
            folded.push(c);
        } else {
            folded.push_str(transliterate(c));
        }
    }

    let keep = Regex::new(SLUG_KEEP_PATTERN).unwrap();
    let stripped = keep.replace_all(&folded, "");

    let separators = Regex::new(r"[\s_-]+").unwrap();
    let mut slug = separators
        .replace_all(stripped.trim(), "-")
        .trim_matches('-')
        .to_string();

    if slug.len() > max_length {
        // Truncate on a char boundary, then drop any trailing hyphen
        let mut cut = max_length;
        while !slug.is_char_boundary(cut) {
            cut -= 1;
        }
        slug.truncate(cut);
        slug = slug.trim_end_matches('-').to_string();
    }

    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

/// Compute a slug unique among the given sibling slugs
///
/// Appends `-1`, `-2`, ... until no collision remains. The suffix counts
/// against the length bound so deduplicated slugs stay within it.
pub fn unique_slug<S: AsRef<str>>(title: &str, siblings: &[S], max_length: usize) -> Option<String> {
    let base = slugify(title, max_length)?;

    let collides = |candidate: &str| siblings.iter().any(|s| s.as_ref() == candidate);

    if !collides(&base) {
        return Some(base);
    }

    for n in 1u32.. {
        let suffix = format!("-{}", n);
        let mut candidate = base.clone();
        if candidate.len() + suffix.len() > max_length {
            let mut cut = max_length.saturating_sub(suffix.len());
            while !candidate.is_char_boundary(cut) {
                cut -= 1;
            }
            candidate.truncate(cut);
            candidate = candidate.trim_end_matches('-').to_string();
        }
        if candidate.is_empty() {
            // Length bounds this tight leave no room for a hyphenated suffix
            candidate = n.to_string();
        } else {
            candidate.push_str(&suffix);
        }
        if candidate.len() <= max_length && !collides(&candidate) {
            return Some(candidate);
        }
    }

    None
}

/// One retired top-level slug of a content
///
/// Recorded whenever a content is renamed, so old URLs keep resolving to the
/// content identifier they pointed at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlugHistoryEntry {
    /// The slug the content used to have
    pub slug: String,

    /// When the rename away from this slug happened
    pub recorded_at: DateTime<Utc>,
}

impl SlugHistoryEntry {
    /// Record a retired slug now
    pub fn new(slug: impl Into<String>) -> Self {
        SlugHistoryEntry {
            slug: slug.into(),
            recorded_at: Utc::now(),
        }
    }
}
