//! Acquisition scoring and candidate selection.

/// Mean-only improvement score: `mean - best - exploration`.
///
/// This is the simplified Expected-Improvement rule; posterior variance is
/// not used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedImprovement {
    pub exploration: f64,
}

impl ExpectedImprovement {
    pub fn new(exploration: f64) -> Self {
        Self { exploration }
    }

    /// Score a candidate. With no best value yet (no observations) every
    /// candidate scores `+inf`.
    pub fn score(&self, predicted_mean: f64, best: Option<f64>) -> f64 {
        match best {
            Some(best) => predicted_mean - best - self.exploration,
            None => f64::INFINITY,
        }
    }
}

/// Index of the highest score, first one on ties. NaN never wins.
pub fn select_best(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}
