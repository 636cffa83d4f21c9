//! Keyword heuristics that decide how an operator's edit instruction is
//! applied before any generation call is made.

use regex::Regex;
use std::sync::OnceLock;

/// Where a generated paragraph is inserted for a recognized topic. The
/// position is fixed per topic, not inferred from the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTopic {
    Greeting,
    CommonMistakes,
    Closing,
}

impl InsertTopic {
    pub fn position(self, paragraph_count: usize) -> usize {
        match self {
            InsertTopic::Greeting => 1,
            InsertTopic::CommonMistakes | InsertTopic::Closing => paragraph_count + 1,
        }
    }

    pub fn prompt_hint(self) -> &'static str {
        match self {
            InsertTopic::Greeting => "a short friendly greeting that opens the post",
            InsertTopic::CommonMistakes => {
                "a paragraph covering common client mistakes and how to avoid them"
            }
            InsertTopic::Closing => "a short closing paragraph with a call to action",
        }
    }
}

/// What the instruction targets, decided purely from its wording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditIntent {
    /// Rewrite exactly one paragraph, addressed by 1-based ordinal.
    TargetedEdit(usize),
    /// Remove paragraphs; fragments are matched against paragraph content.
    Deletion(DeletionTarget),
    /// Generate one new paragraph and insert it at the topic's position.
    Insertion(InsertTopic),
    /// Everything else: rewrite the whole document under instruction.
    WholeDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionTarget {
    Ordinal(usize),
    Fragments(Vec<String>),
}

const DELETION_WORDS: &[&str] = &["remove", "delete", "drop", "exclude"];
const INSERTION_WORDS: &[&str] = &["add", "insert"];

const ORDINAL_WORDS: &[(&str, usize)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
];

const TOPIC_TABLE: &[(&str, InsertTopic)] = &[
    ("greeting", InsertTopic::Greeting),
    ("hello", InsertTopic::Greeting),
    ("common mistakes", InsertTopic::CommonMistakes),
    ("mistakes", InsertTopic::CommonMistakes),
    ("closing", InsertTopic::Closing),
    ("call to action", InsertTopic::Closing),
    ("farewell", InsertTopic::Closing),
];

fn ordinal_digit_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(\d+)(?:st|nd|rd|th)?\s+paragraph").unwrap(),
            Regex::new(r"paragraph\s+(?:no\.?\s*|number\s*)?(\d+)").unwrap(),
        ]
    })
}

fn quoted_fragment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""([^"]+)"|'([^']+)'|«([^»]+)»"#).unwrap())
}

/// Extract a paragraph ordinal (numeral or ordinal word) from the
/// instruction. Only ordinals 1-4 are recognized, matching how operators
/// address short posts.
pub fn extract_paragraph_ordinal(instruction: &str) -> Option<usize> {
    let lower = instruction.to_lowercase();

    for pattern in ordinal_digit_patterns() {
        if let Some(caps) = pattern.captures(&lower)
            && let Some(num) = caps.get(1)
            && let Ok(n) = num.as_str().parse::<usize>()
            && (1..=4).contains(&n)
        {
            return Some(n);
        }
    }

    for (word, n) in ORDINAL_WORDS {
        if lower.contains(word) && lower.contains("paragraph") {
            return Some(*n);
        }
    }
    None
}

fn contains_any(haystack: &str, words: &[&str]) -> bool {
    words
        .iter()
        .any(|w| haystack.split(|c: char| !c.is_alphanumeric()).any(|t| t == *w))
}

fn quoted_fragments(instruction: &str) -> Vec<String> {
    quoted_fragment_pattern()
        .captures_iter(instruction)
        .filter_map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|f| !f.is_empty())
        .collect()
}

/// Comma-separated fragments after the deletion verb, e.g.
/// "remove pricing details, the warranty part".
fn trailing_fragments(lower: &str) -> Vec<String> {
    let Some(pos) = DELETION_WORDS
        .iter()
        .filter_map(|w| lower.find(w).map(|i| i + w.len()))
        .min()
    else {
        return Vec::new();
    };
    let tail = &lower[pos..];
    tail.split(',')
        .map(|f| {
            f.trim()
                .trim_start_matches("the ")
                .trim_start_matches("about ")
                .trim()
                .to_string()
        })
        .filter(|f| f.split_whitespace().count() >= 2)
        .collect()
}

/// Classify an edit instruction. Pure and deterministic; the tables above
/// are the whole rule set, so behavior is unit-testable without a provider.
pub fn classify(instruction: &str) -> EditIntent {
    let lower = instruction.to_lowercase();
    let ordinal = extract_paragraph_ordinal(instruction);

    if contains_any(&lower, DELETION_WORDS) {
        if let Some(n) = ordinal {
            return EditIntent::Deletion(DeletionTarget::Ordinal(n));
        }
        let mut fragments = quoted_fragments(instruction);
        if fragments.is_empty() {
            fragments = trailing_fragments(&lower);
        }
        if !fragments.is_empty() {
            return EditIntent::Deletion(DeletionTarget::Fragments(fragments));
        }
        return EditIntent::WholeDocument;
    }

    if contains_any(&lower, INSERTION_WORDS) {
        for (phrase, topic) in TOPIC_TABLE {
            if lower.contains(phrase) {
                return EditIntent::Insertion(*topic);
            }
        }
        // "add" with no recognized topic is an ordinary rewrite request.
    }

    if let Some(n) = ordinal {
        return EditIntent::TargetedEdit(n);
    }

    EditIntent::WholeDocument
}
