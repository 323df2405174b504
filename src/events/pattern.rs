//! Topic routing-key patterns.
//!
//! Keys are dot-separated words. In a pattern `*` matches exactly one word
//! and `#` matches zero or more words.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Word(String),
    One,
    Many,
}

/// A compiled binding pattern such as `list.checkout.#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn new(raw: &str) -> Self {
        let segments = raw
            .split('.')
            .map(|word| match word {
                "*" => Segment::One,
                "#" => Segment::Many,
                other => Segment::Word(other.to_string()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        let words: Vec<&str> = routing_key.split('.').collect();
        match_from(&self.segments, &words)
    }
}

fn match_from(segments: &[Segment], words: &[&str]) -> bool {
    match segments.split_first() {
        None => words.is_empty(),
        Some((Segment::Many, rest)) => {
            (0..=words.len()).any(|skip| match_from(rest, &words[skip..]))
        }
        Some((Segment::One, rest)) => !words.is_empty() && match_from(rest, &words[1..]),
        Some((Segment::Word(w), rest)) => {
            words.first() == Some(&w.as_str()) && match_from(rest, &words[1..])
        }
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
