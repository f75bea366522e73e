//! Embedding matching.
//!
//! Compares a query embedding against every enrolled identity using cosine
//! similarity and maps similarity to a confidence percentage. A candidate is
//! accepted only when it clears both thresholds; when no candidate clears
//! them the intruder sentinel is returned.

use std::collections::HashMap;

/// Reserved identity returned when no enrolled face passes the thresholds.
pub const INTRUDER: &str = "INTRUDER";

const NORM_EPSILON: f32 = 1e-6;

/// Dual acceptance thresholds for a match candidate.
///
/// `similarity` bounds raw cosine similarity; `confidence` bounds the
/// percentage it maps to. Both must be exceeded strictly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchThresholds {
    pub similarity: f32,
    pub confidence: f32,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            similarity: 0.50,
            confidence: 80.0,
        }
    }
}

/// Best match for a query embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    pub name: String,
    pub confidence: f32,
}

impl MatchResult {
    pub fn is_intruder(&self) -> bool {
        self.name == INTRUDER
    }

    fn intruder() -> Self {
        Self {
            name: INTRUDER.to_string(),
            confidence: 0.0,
        }
    }
}

/// Scale a vector to unit L2 norm in place.
///
/// The epsilon keeps a zero vector from dividing by zero; it stays (near)
/// zero rather than becoming NaN.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    let scale = 1.0 / (norm + NORM_EPSILON);
    for value in vector.iter_mut() {
        *value *= scale;
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Find the enrolled identity closest to `query`.
///
/// Confidence maps similarity from [-1, 1] to [0, 100]. Among candidates
/// that clear both thresholds the highest confidence wins; exact ties keep
/// the first seen (iteration order is not guaranteed, but true ties do not
/// occur on floating-point embeddings in practice).
pub fn match_embedding(
    query: &[f32],
    faces: &HashMap<String, Vec<f32>>,
    thresholds: MatchThresholds,
) -> MatchResult {
    let mut best = MatchResult::intruder();

    for (name, enrolled) in faces {
        let sim = cosine_similarity(query, enrolled);
        let conf = (sim + 1.0) / 2.0 * 100.0;
        if sim > thresholds.similarity && conf > thresholds.confidence && conf > best.confidence {
            best = MatchResult {
                name: name.clone(),
                confidence: conf,
            };
        }
    }

    best
}
