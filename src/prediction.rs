use serde::Serialize;

/// One classifier output entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// A classified image as it appears in the batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictionRecord {
    #[serde(rename = "Filepath")]
    pub file_path: String,
    #[serde(rename = "Language")]
    pub predicted_label: String,
}

impl PredictionRecord {
    pub fn new(file_path: impl Into<String>, predicted_label: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            predicted_label: predicted_label.into(),
        }
    }
}

/// Highest-scoring entry. Ties keep the first one seen.
pub fn top_label(scores: &[LabelScore]) -> Option<&LabelScore> {
    scores.iter().fold(None, |best: Option<&LabelScore>, candidate| match best {
        Some(b) if candidate.score.total_cmp(&b.score).is_le() => Some(b),
        _ => Some(candidate),
    })
}

/// Uppercase the first character and lowercase the rest (`"hindi"` -> `"Hindi"`).
pub fn capitalize_label(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_label_picks_max_score() {
        let scores = vec![
            LabelScore::new("hindi", 0.2),
            LabelScore::new("english", 0.7),
            LabelScore::new("tamil", 0.1),
        ];
        assert_eq!(top_label(&scores).map(|s| s.label.as_str()), Some("english"));
    }

    #[test]
    fn test_top_label_tie_keeps_first() {
        let scores = vec![LabelScore::new("hindi", 0.5), LabelScore::new("english", 0.5)];
        assert_eq!(top_label(&scores).map(|s| s.label.as_str()), Some("hindi"));
    }

    #[test]
    fn test_top_label_empty() {
        assert!(top_label(&[]).is_none());
    }

    #[test]
    fn test_capitalize_label() {
        let cases = vec![
            ("hindi", "Hindi"),
            ("ENGLISH", "English"),
            ("meitei", "Meitei"),
            ("", ""),
        ];
        for (raw, expected) in cases {
            assert_eq!(capitalize_label(raw), expected);
        }
    }
}
