//! Ranking losses.
//!
//! The batch WARP loss in [`explicit_warp`] is assembled from three
//! configurable pieces defined here: the per-pair base loss, the rule that
//! decides whether a negative outranks the positive, and the way per-pair
//! terms are aggregated over the batch.
pub mod explicit_warp;

pub use self::explicit_warp::{rank_weight, ExplicitWarpLoss, LossGradient, ScoreBatch};

/// The loss applied to each (positive, negative) score pair.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PairwiseLoss {
    /// Pairwise hinge loss, `max(0, margin - (positive - negative))`.
    Hinge,
    /// Bayesian Personalised Ranking, `ln(1 + exp(negative - positive))`.
    /// Ignores the margin.
    Bpr,
}

impl Default for PairwiseLoss {
    fn default() -> Self {
        PairwiseLoss::Hinge
    }
}

impl PairwiseLoss {
    /// Value of the loss for a single pair.
    pub fn value(self, margin: f32, positive: f32, negative: f32) -> f32 {
        match self {
            PairwiseLoss::Hinge => (margin - (positive - negative)).max(0.0),
            PairwiseLoss::Bpr => softplus(negative - positive),
        }
    }

    /// Derivative of [`value`](#method.value) with respect to the negative
    /// score. The derivative with respect to the positive score is its
    /// negation.
    pub fn derivative(self, margin: f32, positive: f32, negative: f32) -> f32 {
        match self {
            PairwiseLoss::Hinge => {
                if margin - (positive - negative) > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            PairwiseLoss::Bpr => sigmoid(negative - positive),
        }
    }
}

/// When a negative counts as outranking the positive.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Violation {
    /// The negative scores strictly higher than the positive. Ties are
    /// not ranking failures.
    Strict,
    /// The negative scores at least as high as the positive.
    Inclusive,
}

impl Default for Violation {
    fn default() -> Self {
        Violation::Strict
    }
}

impl Violation {
    /// Whether `negative` violates the ranking of `positive`.
    pub fn is_violation(self, positive: f32, negative: f32) -> bool {
        match self {
            Violation::Strict => negative > positive,
            Violation::Inclusive => negative >= positive,
        }
    }
}

/// How per-negative terms are combined into the batch loss.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Aggregation {
    /// Average over the negatives; invariant to batch size.
    Mean,
    /// Sum over the negatives.
    Sum,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::Mean
    }
}

impl Aggregation {
    /// Factor applied to the sum of `num_negatives` terms.
    pub fn scale(self, num_negatives: usize) -> f32 {
        match self {
            Aggregation::Mean => 1.0 / num_negatives as f32,
            Aggregation::Sum => 1.0,
        }
    }
}

fn softplus(x: f32) -> f32 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
