// ============================================================
// Layer 3   TextPair Domain Type
// ============================================================
// The unit of work for a matching model: two texts and,
// for training data, a binary label saying whether they
// mean the same thing.
//
// Example:
//   left:  "How do I learn Rust quickly?"
//   right: "What is the fastest way to learn Rust?"
//   label: 1.0  (duplicate)

use serde::{Deserialize, Serialize};

/// Two texts to be compared, with an optional 0/1 label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPair {
    /// First text of the pair
    pub left: String,

    /// Second text of the pair
    pub right: String,

    /// 1.0 when the texts match, 0.0 when they don't.
    /// Absent for pairs that only need scoring.
    #[serde(default)]
    pub label: Option<f32>,
}

impl TextPair {
    /// Create an unlabeled pair
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left:  left.into(),
            right: right.into(),
            label: None,
        }
    }

    /// Create a labelled pair (any label > 0.5 counts as a match)
    pub fn labelled(left: impl Into<String>, right: impl Into<String>, label: f32) -> Self {
        Self {
            left:  left.into(),
            right: right.into(),
            label: Some(if label > 0.5 { 1.0 } else { 0.0 }),
        }
    }

    pub fn is_labelled(&self) -> bool {
        self.label.is_some()
    }
}

/// The model's verdict on one pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    /// Calibrated probability that the two texts match
    pub probability: f32,

    /// `probability >= threshold`
    pub prediction: bool,
}

impl PairScore {
    pub fn new(probability: f32, threshold: f32) -> Self {
        Self {
            probability,
            prediction: probability >= threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_binarises_label() {
        assert_eq!(TextPair::labelled("a", "b", 0.9).label, Some(1.0));
        assert_eq!(TextPair::labelled("a", "b", 0.2).label, Some(0.0));
        assert!(!TextPair::new("a", "b").is_labelled());
    }

    #[test]
    fn test_missing_label_deserialises_as_none() {
        let pair: TextPair = serde_json::from_str(r#"{"left":"a","right":"b"}"#).unwrap();
        assert_eq!(pair.label, None);

        let pair: TextPair = serde_json::from_str(r#"{"left":"a","right":"b","label":1}"#).unwrap();
        assert_eq!(pair.label, Some(1.0));
    }

    #[test]
    fn test_score_threshold_is_inclusive() {
        assert!(PairScore::new(0.5, 0.5).prediction);
        assert!(!PairScore::new(0.49, 0.5).prediction);
    }
}
