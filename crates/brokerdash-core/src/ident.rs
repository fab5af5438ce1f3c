//! Listing identifier normalisation.
//!
//! Listings reach the dashboard under many textual forms: `#045348`,
//! `رقم الاعلان: ...045348`, `AD-12-7` embedded in a sentence. Every lookup
//! goes through [`normalize`] first, so all of those forms resolve to a single
//! canonical ID.
//!
//! The function is pure, total, and idempotent.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

/// The "listing number:" label in the three spellings seen in the wild.
/// Matched case-sensitively and only at the start of the reference.
pub const LABEL_PREFIXES: [&str; 3] =
  ["رقم الاعلان:", "رقم الإعلان:", "رقم الأعلان:"];

static STRUCTURED_ID: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"AD-[0-9]+-[0-9]+").expect("valid regex"));

static ELLIPSIS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\.{3,}").expect("valid regex"));

/// Map an arbitrary listing reference to its canonical ID.
///
/// 1. strip a single leading `#`
/// 2. strip a leading "listing number:" label
/// 3. drop runs of three or more dots
/// 4. trim whitespace
/// 5. return the leftmost `AD-<digits>-<digits>` match, if any
/// 6. otherwise return the cleaned string
///
/// Steps 1–4 repeat until nothing changes, so that inputs like `"  #12"`
/// (where trimming exposes a `#`) still normalise idempotently. When several
/// structured IDs appear, the leftmost wins.
pub fn normalize(raw: &str) -> String {
  let mut current = raw.to_owned();
  loop {
    let next = clean_once(&current);
    if next == current {
      break;
    }
    current = next;
  }

  match STRUCTURED_ID.find(&current) {
    Some(m) => m.as_str().to_owned(),
    None => current,
  }
}

/// Normalise `reference`, rejecting references that normalise to nothing.
pub fn canonical_id(reference: &str) -> Result<String> {
  let id = normalize(reference);
  if id.is_empty() {
    return Err(Error::EmptyIdentifier(reference.to_owned()));
  }
  Ok(id)
}

/// Whether `id` is exactly a structured `AD-<digits>-<digits>` identifier.
pub fn is_structured(id: &str) -> bool {
  STRUCTURED_ID
    .find(id)
    .is_some_and(|m| m.start() == 0 && m.end() == id.len())
}

fn clean_once(s: &str) -> String {
  let s = s.strip_prefix('#').unwrap_or(s);
  let s = LABEL_PREFIXES
    .iter()
    .find_map(|label| s.strip_prefix(label))
    .unwrap_or(s);
  ELLIPSIS.replace_all(s, "").trim().to_owned()
}
