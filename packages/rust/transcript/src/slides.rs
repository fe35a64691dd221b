//! Slide text cleanup.
//!
//! Each slide arrives as the text of one PDF page whose first line is a header
//! (page number + filename). The header is dropped and the remaining
//! non-blank lines are rejoined into a single line.

use std::sync::LazyLock;

use regex::Regex;

/// Clean one slide's text. Returns `None` when nothing but the header remains.
pub fn clean_slide(text: &str) -> Option<String> {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let body: Vec<&str> = text
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if body.is_empty() {
        return None;
    }

    Some(WS_RE.replace_all(&body.join(" "), " ").into_owned())
}
