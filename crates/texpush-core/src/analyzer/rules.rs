//! Line classification rules.
//!
//! Counting is line-based: every line is tested against an ordered table of
//! `(category, pattern)` rules and increments each matching category at most
//! once. A diagnostic that spans several lines may therefore be counted more
//! or less than once; that coarseness is intentional.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How many overfull/underfull lines are kept as examples.
pub const MAX_BOX_EXAMPLES: usize = 10;

/// Diagnostic category a line can fall into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Warning,
    Error,
    Overfull,
    Underfull,
}

/// One pattern and the category it counts towards.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub category: Category,
    pub pattern: Regex,
}

impl ClassificationRule {
    pub fn new(category: Category, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            pattern: Regex::new(pattern)?,
        })
    }

    /// Rule matching `needle` literally.
    pub fn literal(category: Category, needle: &str) -> Self {
        Self {
            category,
            pattern: Regex::new(&regex::escape(needle)).expect("escaped literal is a valid regex"),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

static LATEX_RULES: LazyLock<RuleSet> = LazyLock::new(|| {
    let builtin = |category, pattern| {
        ClassificationRule::new(category, pattern).expect("Invalid builtin classification rule")
    };
    RuleSet::new(vec![
        ClassificationRule::literal(Category::Warning, "LaTeX Warning"),
        builtin(Category::Warning, r"(?i)warning:"),
        builtin(Category::Error, r"^!"),
        ClassificationRule::literal(Category::Error, "Error:"),
        ClassificationRule::literal(Category::Error, "Fatal"),
        ClassificationRule::literal(Category::Overfull, r"Overfull \hbox"),
        ClassificationRule::literal(Category::Underfull, r"Underfull \hbox"),
    ])
});

/// Per-category tallies plus the retained box examples.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineCounts {
    pub warnings: usize,
    pub errors: usize,
    pub overfull: usize,
    pub underfull: usize,
    pub overfull_examples: Vec<String>,
    pub underfull_examples: Vec<String>,
}

impl LineCounts {
    fn add(&mut self, category: Category, line: &str) {
        match category {
            Category::Warning => self.warnings += 1,
            Category::Error => self.errors += 1,
            Category::Overfull => {
                self.overfull += 1;
                if self.overfull_examples.len() < MAX_BOX_EXAMPLES {
                    self.overfull_examples.push(line.trim_end().to_string());
                }
            }
            Category::Underfull => {
                self.underfull += 1;
                if self.underfull_examples.len() < MAX_BOX_EXAMPLES {
                    self.underfull_examples.push(line.trim_end().to_string());
                }
            }
        }
    }
}

/// Ordered rule table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Rules for LaTeX-family compiler output.
    pub fn latex() -> &'static RuleSet {
        &LATEX_RULES
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Categories a single line falls into, in rule order, without repeats.
    pub fn classify(&self, line: &str) -> Vec<Category> {
        let mut hits = Vec::new();
        for rule in &self.rules {
            if !hits.contains(&rule.category) && rule.matches(line) {
                hits.push(rule.category);
            }
        }
        hits
    }

    /// Tally every line of `text`.
    pub fn count(&self, text: &str) -> LineCounts {
        let mut counts = LineCounts::default();
        for line in text.lines() {
            for category in self.classify(line) {
                counts.add(category, line);
            }
        }
        counts
    }
}
