//! Excerpt production: strip build-driver noise, then take the tail.

use std::sync::LazyLock;

use regex::RegexSet;

/// Lines that carry no information about the document: engine banners,
/// latexmk rule traces, and collected-input summaries.
static BOILERPLATE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*$",
        r"^This is (pdf|Xe|Lua|LuaHB|e-|ep|eup)?TeX, Version",
        r"^\s*restricted \\write18 enabled",
        r"^\s*entering extended mode",
        r"^ ?%&-line parsing enabled",
        r"^(LaTeX2e|L3 programming layer) <",
        r"^Latexmk: ",
        r"^Rc files read:",
        r"^Rule '[^']*'",
        r"^Run number \d+ of rule",
        r"^-{6,}\s*$",
        r"^Collected input files",
        r"^For rule '",
        r"^=== ",
    ])
    .expect("Invalid boilerplate patterns")
});

pub fn is_boilerplate(line: &str) -> bool {
    BOILERPLATE.is_match(line)
}

/// All content-bearing lines of `text`, in order.
pub fn filter_boilerplate(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !is_boilerplate(line))
        .map(|line| line.trim_end().to_string())
        .collect()
}

/// The last `max_lines` content-bearing lines of `text`.
pub fn excerpt(text: &str, max_lines: usize) -> Vec<String> {
    let mut lines = filter_boilerplate(text);
    let skip = lines.len().saturating_sub(max_lines);
    lines.drain(..skip);
    lines
}
