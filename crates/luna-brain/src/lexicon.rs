//! Keyword and pattern analysis shared by every brain.
//!
//! Results are a pure function of the input text so that chat behaviour is
//! reproducible in tests.

use std::sync::LazyLock;

use luna_common::{Emotion, EmotionScore, MemoryKind};
use regex::Regex;

use crate::brain::MemoryCandidate;

const LEXICON: &[(Emotion, &[&str])] = &[
    (
        Emotion::Joy,
        &[
            "happy", "glad", "great", "awesome", "wonderful", "excited", "fun", "amazing",
            "yay", "delighted", "cheerful", "good",
        ],
    ),
    (
        Emotion::Sadness,
        &[
            "sad", "lonely", "depressed", "unhappy", "miss", "cry", "crying", "hurt", "upset",
            "down", "tired",
        ],
    ),
    (
        Emotion::Anger,
        &["angry", "mad", "furious", "annoyed", "hate", "irritated", "frustrated"],
    ),
    (
        Emotion::Fear,
        &["scared", "afraid", "worried", "anxious", "nervous", "terrified", "fear"],
    ),
    (
        Emotion::Surprise,
        &["wow", "surprised", "unexpected", "shocked", "whoa", "omg"],
    ),
    (
        Emotion::Love,
        &["love", "adore", "care", "sweet", "darling", "heart", "cherish"],
    ),
];

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Score each emotion by its share of lexicon hits. Text with no hits is
/// fully neutral. Scores are sorted strongest first.
pub fn analyze_emotions(text: &str) -> Vec<EmotionScore> {
    let mut hits = [0u32; LEXICON.len()];
    for word in words(text) {
        for (idx, (_, keywords)) in LEXICON.iter().enumerate() {
            if keywords.contains(&word.as_str()) {
                hits[idx] += 1;
            }
        }
    }

    let total: u32 = hits.iter().sum();
    if total == 0 {
        return vec![EmotionScore {
            emotion: Emotion::Neutral,
            score: 1.0,
        }];
    }

    let mut scores: Vec<EmotionScore> = LEXICON
        .iter()
        .zip(hits)
        .filter(|(_, count)| *count > 0)
        .map(|((emotion, _), count)| EmotionScore {
            emotion: *emotion,
            score: count as f32 / total as f32,
        })
        .collect();
    // Stable sort keeps lexicon order between ties.
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores
}

struct Pattern {
    regex: Regex,
    kind: MemoryKind,
    importance: u8,
    render: fn(&regex::Captures<'_>) -> String,
}

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    let build = |re: &str| Regex::new(re).expect("memory pattern is valid");
    vec![
        Pattern {
            regex: build(r"(?i)\bmy name is ([A-Za-z][A-Za-z' -]{0,40}?)\s*(?:[.!?,]|$)"),
            kind: MemoryKind::Fact,
            importance: 9,
            render: |c| format!("User's name is {}", c[1].trim()),
        },
        Pattern {
            regex: build(r"(?i)\bmy birthday is ([^.!?,]{1,40})"),
            kind: MemoryKind::Event,
            importance: 8,
            render: |c| format!("User's birthday is {}", c[1].trim()),
        },
        Pattern {
            regex: build(r"(?i)\bi work (as|at|in|for) ([^.!?,]{1,60})"),
            kind: MemoryKind::Fact,
            importance: 7,
            render: |c| format!("User works {} {}", c[1].to_lowercase(), c[2].trim()),
        },
        Pattern {
            regex: build(r"(?i)\bi (love|like|enjoy) ([^.!?,]{1,60})"),
            kind: MemoryKind::Preference,
            importance: 6,
            render: |c| format!("User {}s {}", c[1].to_lowercase(), c[2].trim()),
        },
        Pattern {
            regex: build(r"(?i)\bi (?:hate|dislike|can't stand) ([^.!?,]{1,60})"),
            kind: MemoryKind::Preference,
            importance: 6,
            render: |c| format!("User dislikes {}", c[1].trim()),
        },
        Pattern {
            regex: build(r"(?i)\bi(?: am|'m) (?:a |an )?([^.!?,]{1,40})"),
            kind: MemoryKind::Fact,
            importance: 5,
            render: |c| format!("User is {}", c[1].trim()),
        },
    ]
});

/// Pull memory candidates out of a user message. "I am ..." statements that
/// describe a feeling become short-lived emotion memories instead of facts.
pub fn extract_memories(text: &str) -> Vec<MemoryCandidate> {
    let mut found: Vec<MemoryCandidate> = Vec::new();

    for pattern in PATTERNS.iter() {
        for captures in pattern.regex.captures_iter(text) {
            let content = (pattern.render)(&captures);
            let mut candidate = MemoryCandidate {
                kind: pattern.kind,
                content,
                importance: pattern.importance,
            };

            if pattern.kind == MemoryKind::Fact && candidate.content.starts_with("User is ") {
                let feeling = analyze_emotions(&candidate.content);
                if feeling[0].emotion != Emotion::Neutral {
                    candidate.kind = MemoryKind::Emotion;
                    candidate.content = candidate.content.replacen("User is", "User felt", 1);
                    candidate.importance = 3;
                }
            }

            if !found.iter().any(|m| m.content.eq_ignore_ascii_case(&candidate.content)) {
                found.push(candidate);
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::{analyze_emotions, extract_memories};
    use luna_common::{Emotion, MemoryKind};

    #[test]
    fn no_keywords_is_neutral() {
        let scores = analyze_emotions("The train leaves at noon.");
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].emotion, Emotion::Neutral);
        assert_eq!(scores[0].score, 1.0);
    }

    #[test]
    fn scores_are_normalized_and_sorted() {
        let scores = analyze_emotions("I'm so happy and excited, but a little worried.");
        assert_eq!(scores[0].emotion, Emotion::Joy);
        let total: f32 = scores.iter().map(|s| s.score).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(scores.iter().any(|s| s.emotion == Emotion::Fear));
    }

    #[test]
    fn analysis_is_case_insensitive() {
        assert_eq!(analyze_emotions("I LOVE this")[0].emotion, Emotion::Love);
    }

    #[test]
    fn extracts_name_and_preferences() {
        let memories = extract_memories("Hi! My name is Alice. I love hiking in the mountains.");
        assert!(memories.iter().any(|m| m.kind == MemoryKind::Fact
            && m.content == "User's name is Alice"
            && m.importance == 9));
        assert!(memories.iter().any(|m| m.kind == MemoryKind::Preference
            && m.content == "User loves hiking in the mountains"));
    }

    #[test]
    fn feelings_become_emotion_memories() {
        let memories = extract_memories("I'm really tired today");
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].kind, MemoryKind::Emotion);
        assert_eq!(memories[0].content, "User felt really tired today");
    }

    #[test]
    fn plain_chatter_yields_nothing() {
        assert!(extract_memories("What should we talk about?").is_empty());
    }
}
