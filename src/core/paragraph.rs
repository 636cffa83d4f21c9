use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextError {
    #[error("paragraph index {index} out of range (1..={len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Post text as an ordered sequence of non-empty paragraphs.
///
/// Paragraphs are the unit of targeted editing: once a draft enters the
/// refinement loop it is only mutated through the indexed operations here,
/// never by wholesale rewriting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParagraphedText {
    paragraphs: Vec<String>,
}

impl ParagraphedText {
    /// Split free text on blank-line boundaries. Empty input yields an
    /// empty sequence; there is no error case.
    pub fn parse(text: &str) -> Self {
        // A "blank" separator line may still carry whitespace, so walk
        // lines instead of splitting on a literal "\n\n".
        let mut out = Vec::new();
        let mut current = String::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                if !current.trim().is_empty() {
                    out.push(current.trim().to_string());
                }
                current.clear();
            } else {
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line);
            }
        }
        if !current.trim().is_empty() {
            out.push(current.trim().to_string());
        }

        Self { paragraphs: out }
    }

    pub fn from_paragraphs(paragraphs: Vec<String>) -> Self {
        Self { paragraphs }
    }

    /// Join paragraphs with exactly one blank line. `serialize` after
    /// `parse` is idempotent: re-parsing the result yields the same
    /// sequence.
    pub fn serialize(&self) -> String {
        self.paragraphs.join("\n\n")
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// 1-based access, mirroring how operators refer to paragraphs.
    pub fn get(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.paragraphs.get(index - 1).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paragraphs.iter().map(String::as_str)
    }

    fn check_index(&self, index: usize, max: usize) -> Result<(), TextError> {
        if index < 1 || index > max {
            return Err(TextError::IndexOutOfRange {
                index,
                len: self.paragraphs.len(),
            });
        }
        Ok(())
    }

    /// Replace the paragraph at `index` (1-based). Every other paragraph
    /// is carried over untouched.
    pub fn replace(&self, index: usize, new_paragraph: &str) -> Result<Self, TextError> {
        self.check_index(index, self.paragraphs.len())?;
        let mut paragraphs = self.paragraphs.clone();
        paragraphs[index - 1] = new_paragraph.trim().to_string();
        Ok(Self { paragraphs })
    }

    /// Insert so the new paragraph becomes position `index` (1-based).
    /// `1` prepends, `len + 1` appends.
    pub fn insert(&self, index: usize, new_paragraph: &str) -> Result<Self, TextError> {
        self.check_index(index, self.paragraphs.len() + 1)?;
        let mut paragraphs = self.paragraphs.clone();
        paragraphs.insert(index - 1, new_paragraph.trim().to_string());
        Ok(Self { paragraphs })
    }

    /// Remove every listed 1-based index. Duplicates are deduplicated and
    /// removal runs in descending order so earlier removals cannot shift
    /// later targets. Any invalid index fails the whole operation.
    pub fn remove_many(&self, indices: &[usize]) -> Result<Self, TextError> {
        let mut targets: Vec<usize> = indices.to_vec();
        targets.sort_unstable();
        targets.dedup();
        for &index in &targets {
            self.check_index(index, self.paragraphs.len())?;
        }

        let mut paragraphs = self.paragraphs.clone();
        for &index in targets.iter().rev() {
            paragraphs.remove(index - 1);
        }
        Ok(Self { paragraphs })
    }

    /// First paragraph matching `phrase`: either the whole phrase appears
    /// (case-insensitive) or at least half of its significant words
    /// (length > 2) do. Left-to-right scan, first match wins.
    pub fn find_by_keywords(&self, phrase: &str) -> Option<usize> {
        let phrase_lower = phrase.trim().to_lowercase();
        if phrase_lower.is_empty() {
            return None;
        }
        let words: Vec<&str> = phrase_lower
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .collect();

        for (i, paragraph) in self.paragraphs.iter().enumerate() {
            let lower = paragraph.to_lowercase();
            if lower.contains(&phrase_lower) {
                return Some(i + 1);
            }
            if !words.is_empty() {
                let hits = words.iter().filter(|w| lower.contains(*w)).count();
                if hits * 2 >= words.len() {
                    return Some(i + 1);
                }
            }
        }
        None
    }

    /// `find_by_keywords` per phrase, unique indices, ascending.
    pub fn find_many_by_keywords(&self, phrases: &[String]) -> Vec<usize> {
        let mut found: Vec<usize> = phrases
            .iter()
            .filter_map(|p| self.find_by_keywords(p))
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }
}
