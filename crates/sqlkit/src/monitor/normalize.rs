//! SQL pattern normalization.
//!
//! All patterns go through the `regex` crate, whose matching is linear in the
//! input length, and input is truncated first.

use regex::Regex;
use std::sync::OnceLock;

/// SQL longer than this is cut (on a char boundary) before normalization.
pub const MAX_NORMALIZE_BYTES: usize = 10_000;

struct Patterns {
    string: Regex,
    numbered: Regex,
    number: Regex,
    in_list: Regex,
    space: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        string: Regex::new(r"'(?:[^']|'')*'").expect("invalid built-in string regex"),
        numbered: Regex::new(r"\$\d+").expect("invalid built-in placeholder regex"),
        number: Regex::new(r"\b\d+(?:\.\d+)?\b").expect("invalid built-in number regex"),
        in_list: Regex::new(r"(?i)\bIN\s*\(\s*\?(?:\s*,\s*\?)*\s*\)")
            .expect("invalid built-in IN-list regex"),
        space: Regex::new(r"\s+").expect("invalid built-in whitespace regex"),
    })
}

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Collapse a statement to its shape: quoted strings, numbers, numbered
/// placeholders and `IN (...)` lists become `?`; whitespace runs become one space.
///
/// ```ignore
/// assert_eq!(
///     normalize_sql("SELECT * FROM posts WHERE id = 42"),
///     "SELECT * FROM posts WHERE id = ?"
/// );
/// ```
pub fn normalize_sql(sql: &str) -> String {
    let p = patterns();
    let sql = truncate_sql_bytes(sql, MAX_NORMALIZE_BYTES);
    let s = p.string.replace_all(sql, "?");
    let s = p.numbered.replace_all(&s, "?");
    let s = p.number.replace_all(&s, "?");
    let s = p.in_list.replace_all(&s, "IN (?)");
    let s = p.space.replace_all(&s, " ");
    s.trim().to_string()
}
