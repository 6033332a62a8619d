//! Sibling name collision resolution
//!
//! When unique naming is enabled, a media item saved under a parent that
//! already holds an item of the same name (case-insensitively) is renamed to
//! the first free `"Name (n)"`, counting from 1.
//!
//! Candidates are ordered so that a base name and its numbered variants form one
//! ascending family (`Photo`, `Photo (1)`, `Photo (2)`, ...). Walking that order
//! and bumping the working name on every hit yields the smallest free suffix no
//! matter how the rows came back from the database.
//!
//! ```rust
//! use mediastore_core::services::resolve_unique_name;
//!
//! let siblings = vec![
//!     (1, "Photo (3)".to_string()),
//!     (2, "Photo".to_string()),
//!     (3, "Photo (1)".to_string()),
//! ];
//! assert_eq!(resolve_unique_name("Photo", &siblings, None), "Photo (2)");
//! ```

use crate::db::{QueryMetrics, StatementKind};
use crate::models::MEDIA_OBJECT_TYPE;
use crate::services::select::like_escape;
use crate::services::RepositoryError;
use libsql::{params, Connection};
use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// `"Name (n)"`: stem, then a space and a parenthesized counter
const SUFFIX_PATTERN: &str = r"^(.*) \((\d+)\)$";

fn suffix_pattern() -> &'static Regex {
    static SUFFIX_REGEX: OnceLock<Regex> = OnceLock::new();
    SUFFIX_REGEX.get_or_init(|| Regex::new(SUFFIX_PATTERN).unwrap())
}

/// Split a name into its lowercased stem and numeric `" (n)"` suffix
fn family_key(name: &str) -> (String, Option<u64>) {
    if let Some(captures) = suffix_pattern().captures(name) {
        if let Ok(n) = captures[2].parse::<u64>() {
            return (captures[1].to_lowercase(), Some(n));
        }
    }
    (name.to_lowercase(), None)
}

/// Total order over sibling names that keeps numbered variants together
///
/// Names compare by lowercased stem, then by suffix (bare name first, then
/// ascending n), then by the raw name.
pub fn compare_similar_names(a: &str, b: &str) -> Ordering {
    family_key(a)
        .cmp(&family_key(b))
        .then_with(|| a.cmp(b))
}

/// Pick the name `desired` should be saved under among `siblings`
///
/// `siblings` are `(id, name)` pairs in any order; `self_id` is excluded so an
/// item never collides with itself.
pub fn resolve_unique_name(desired: &str, siblings: &[(i64, String)], self_id: Option<i64>) -> String {
    let mut candidates: Vec<&str> = siblings
        .iter()
        .filter(|(id, _)| Some(*id) != self_id)
        .map(|(_, name)| name.as_str())
        .collect();
    candidates.sort_by(|a, b| compare_similar_names(a, b));

    let mut current = desired.to_string();
    let mut suffix = 1;
    for candidate in candidates {
        if candidate.to_lowercase() == current.to_lowercase() {
            current = format!("{} ({})", desired, suffix);
            suffix += 1;
        }
    }

    current
}

/// Media siblings under `parent_id` whose name starts with `prefix`
///
/// The prefix match is a superset scan: it returns `Photo`, `Photo (1)` and
/// also `Photograph`; the resolver ignores what does not collide.
pub(crate) async fn fetch_similar_siblings(
    conn: &Connection,
    parent_id: Option<i64>,
    prefix: &str,
    metrics: &QueryMetrics,
) -> Result<Vec<(i64, String)>, RepositoryError> {
    metrics.record(StatementKind::Lookup);
    let mut rows = conn
        .query(
            "SELECT id, text FROM node \
             WHERE parent_id IS ? AND node_object_type = ? AND text LIKE ? ESCAPE '\\'",
            params![parent_id, MEDIA_OBJECT_TYPE, format!("{}%", like_escape(prefix))],
        )
        .await?;

    let mut siblings = Vec::new();
    while let Some(row) = rows.next().await? {
        siblings.push((row.get::<i64>(0)?, row.get::<String>(1)?));
    }

    Ok(siblings)
}
