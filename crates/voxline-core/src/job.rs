use crate::types::SynthesisParams;
use regex::Regex;
use std::sync::LazyLock;

/// Tag prepended to text that does not name a speaker
pub const DEFAULT_SPEAKER_TAG: &str = "[S1]";

static SPEAKER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[S[0-9]\]").expect("speaker tag pattern is valid"));

/// One queued unit of synthesis work, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: u64,
    text: String,
    params: SynthesisParams,
}

impl Job {
    /// Build a job, normalizing the speaker tag once
    pub fn new(id: u64, text: impl AsRef<str>, params: SynthesisParams) -> Self {
        Self {
            id,
            text: normalize_speaker_tag(text.as_ref()),
            params,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Text as dispatched to the engine
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &SynthesisParams {
        &self.params
    }

    /// Short form of the text for log lines
    pub fn preview(&self) -> String {
        const MAX: usize = 60;
        match self.text.char_indices().nth(MAX) {
            Some((idx, _)) => format!("{}...", &self.text[..idx]),
            None => self.text.clone(),
        }
    }
}

/// Prefix `[S1]` unless the text already starts with a `[S<digit>]` tag
pub fn normalize_speaker_tag(text: &str) -> String {
    if has_speaker_tag(text) {
        text.to_string()
    } else {
        format!("{DEFAULT_SPEAKER_TAG}{text}")
    }
}

pub fn has_speaker_tag(text: &str) -> bool {
    SPEAKER_TAG.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_text_gets_default_tag() {
        let job = Job::new(1, "hello", SynthesisParams::default());
        assert_eq!(job.text(), "[S1]hello");
    }

    #[test]
    fn test_tagged_text_is_unchanged() {
        assert_eq!(normalize_speaker_tag("[S2]hi"), "[S2]hi");
        assert_eq!(normalize_speaker_tag("[S9] spaced"), "[S9] spaced");
    }

    #[test]
    fn test_partial_tags_are_not_speaker_tags() {
        assert_eq!(normalize_speaker_tag("[S]x"), "[S1][S]x");
        assert_eq!(normalize_speaker_tag("[SX]x"), "[S1][SX]x");
        assert_eq!(normalize_speaker_tag("[S10]x"), "[S1][S10]x");
        assert_eq!(normalize_speaker_tag(" [S2]x"), "[S1] [S2]x");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(80);
        let job = Job::new(3, &long, SynthesisParams::default());
        let preview = job.preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 63);
    }
}
