//! Explicit-feedback batch WARP loss.
//!
//! Classical WARP keeps sampling negatives until one outranks the positive
//! and weights the resulting hinge term by a function of the number of
//! samples drawn. Here a fixed batch of negatives is scored at once instead,
//! and the loss for a positive item is
//!
//! ```text
//! w_rank     = ln(violations + 1) + 1
//! w_explicit = (r_pos + (r_max - r_neg)) / r_max
//! loss       = w_rank * aggregate_i(w_explicit_i * pairwise(s_pos, s_neg_i))
//! ```
//!
//! where `violations` counts the negatives scored above the positive and
//! `r_neg` falls back to `r_unknown` for negatives the user never rated.
//! Violations are counted, not differentiated: `w_rank` is treated as a
//! constant when computing gradients.
use std::borrow::Cow;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use super::{Aggregation, PairwiseLoss, Violation};
use crate::{LossError, Rating};

/// Weight applied to a batch in which `violations` negatives outrank the
/// positive. Equals `1.0` when there are none and grows logarithmically.
pub fn rank_weight(violations: usize) -> f32 {
    (violations as f32).ln_1p() + 1.0
}

fn default_margin() -> f32 {
    1.0
}

/// Scores and ratings for one positive item and its sampled negatives.
#[derive(Clone, Copy, Debug)]
pub struct ScoreBatch<'a> {
    positive_score: f32,
    positive_rating: Rating,
    negative_scores: &'a [f32],
    negative_ratings: &'a [Option<Rating>],
}

impl<'a> ScoreBatch<'a> {
    /// Build a new batch. `negative_ratings[i]` is the rating the user gave
    /// the negative scored `negative_scores[i]`, or `None` if unrated.
    pub fn new(
        positive_score: f32,
        positive_rating: Rating,
        negative_scores: &'a [f32],
        negative_ratings: &'a [Option<Rating>],
    ) -> Self {
        ScoreBatch {
            positive_score,
            positive_rating,
            negative_scores,
            negative_ratings,
        }
    }

    /// Predicted score of the positive item.
    pub fn positive_score(&self) -> f32 {
        self.positive_score
    }

    /// Rating of the positive item.
    pub fn positive_rating(&self) -> Rating {
        self.positive_rating
    }

    /// Predicted scores of the negatives.
    pub fn negative_scores(&self) -> &'a [f32] {
        self.negative_scores
    }

    /// Ratings of the negatives.
    pub fn negative_ratings(&self) -> &'a [Option<Rating>] {
        self.negative_ratings
    }

    /// Number of negatives.
    pub fn len(&self) -> usize {
        self.negative_scores.len()
    }

    /// Whether the batch has no negatives.
    pub fn is_empty(&self) -> bool {
        self.negative_scores.is_empty()
    }
}

/// Loss value together with its derivatives with respect to the scores.
#[derive(Clone, Debug, PartialEq)]
pub struct LossGradient {
    /// The loss.
    pub loss: f32,
    /// Derivative with respect to the positive score.
    pub positive: f32,
    /// Derivatives with respect to each negative score.
    pub negatives: Vec<f32>,
}

/// Explicit-feedback batch WARP loss.
///
/// Build with [`new`](#method.new) and adjust with the builder methods:
///
/// ```rust
/// # extern crate acf;
/// use acf::losses::{Aggregation, ExplicitWarpLoss, PairwiseLoss, Violation};
///
/// let loss = ExplicitWarpLoss::new(5.0, 3.0)
///     .margin(0.5)
///     .pairwise_loss(PairwiseLoss::Hinge)
///     .violation(Violation::Strict)
///     .aggregation(Aggregation::Mean);
///
/// assert!(loss.validate().is_ok());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExplicitWarpLoss {
    r_max: Rating,
    r_unknown: Rating,
    #[serde(default = "default_margin")]
    margin: f32,
    #[serde(default)]
    pairwise_loss: PairwiseLoss,
    #[serde(default)]
    violation: Violation,
    #[serde(default)]
    aggregation: Aggregation,
}

impl ExplicitWarpLoss {
    /// Build a loss for ratings on `[0, r_max]`, substituting `r_unknown`
    /// for negatives without a rating.
    pub fn new(r_max: Rating, r_unknown: Rating) -> Self {
        ExplicitWarpLoss {
            r_max,
            r_unknown,
            margin: default_margin(),
            pairwise_loss: PairwiseLoss::default(),
            violation: Violation::default(),
            aggregation: Aggregation::default(),
        }
    }

    /// Set the hinge margin.
    pub fn margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    /// Set the per-pair loss.
    pub fn pairwise_loss(mut self, pairwise_loss: PairwiseLoss) -> Self {
        self.pairwise_loss = pairwise_loss;
        self
    }

    /// Set the violation rule.
    pub fn violation(mut self, violation: Violation) -> Self {
        self.violation = violation;
        self
    }

    /// Set the batch aggregation.
    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Maximum rating.
    pub fn r_max(&self) -> Rating {
        self.r_max
    }

    /// Fallback rating for unrated negatives.
    pub fn r_unknown(&self) -> Rating {
        self.r_unknown
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), LossError> {
        if !(self.r_max.is_finite() && self.r_max > 0.0) {
            return Err(LossError::InvalidMaxRating(self.r_max));
        }

        if !(self.r_unknown >= 0.0 && self.r_unknown <= self.r_max) {
            return Err(LossError::InvalidUnknownRating {
                rating: self.r_unknown,
                r_max: self.r_max,
            });
        }

        if !(self.margin.is_finite() && self.margin >= 0.0) {
            return Err(LossError::InvalidMargin(self.margin));
        }

        Ok(())
    }

    fn check_rating(&self, rating: Rating) -> Result<Rating, LossError> {
        if rating >= 0.0 && rating <= self.r_max {
            Ok(rating)
        } else {
            Err(LossError::RatingOutOfRange {
                rating,
                r_max: self.r_max,
            })
        }
    }

    // Batch checks only; the configuration is validated by the caller.
    fn check_batch(&self, batch: &ScoreBatch) -> Result<(), LossError> {
        if batch.negative_scores.len() != batch.negative_ratings.len() {
            return Err(LossError::LengthMismatch {
                scores: batch.negative_scores.len(),
                ratings: batch.negative_ratings.len(),
            });
        }

        if batch.is_empty() {
            return Err(LossError::EmptyBatch);
        }

        if !batch.positive_score.is_finite()
            || batch.negative_scores.iter().any(|score| !score.is_finite())
        {
            return Err(LossError::NonFiniteScore);
        }

        self.check_rating(batch.positive_rating)?;

        for &rating in batch.negative_ratings.iter().filter_map(Option::as_ref) {
            self.check_rating(rating)?;
        }

        Ok(())
    }

    /// Rating used for a negative: the observed one, or `r_unknown`.
    pub fn resolve_rating(&self, rating: Option<Rating>) -> Rating {
        rating.unwrap_or(self.r_unknown)
    }

    /// Number of negatives outranking the positive.
    pub fn violations(&self, batch: &ScoreBatch) -> usize {
        batch
            .negative_scores
            .iter()
            .filter(|&&negative| self.violation.is_violation(batch.positive_score, negative))
            .count()
    }

    /// Weight of a (positive, negative) pair given their effective ratings.
    /// Large when the positive is rated highly and the negative poorly.
    pub fn explicit_weight(&self, positive_rating: Rating, negative_rating: Rating) -> f32 {
        (positive_rating + (self.r_max - negative_rating)) / self.r_max
    }

    // A zero explicit weight zeroes the term even when the pairwise loss
    // overflowed.
    fn weighted_value(&self, explicit_weight: f32, positive: f32, negative: f32) -> f32 {
        if explicit_weight == 0.0 {
            0.0
        } else {
            explicit_weight * self.pairwise_loss.value(self.margin, positive, negative)
        }
    }

    fn check_loss(loss: f32) -> Result<f32, LossError> {
        if loss.is_finite() {
            Ok(loss)
        } else {
            Err(LossError::NonFiniteLoss)
        }
    }

    /// Compute the loss of a batch.
    pub fn loss(&self, batch: &ScoreBatch) -> Result<f32, LossError> {
        self.validate()?;
        self.evaluate(batch)
    }

    fn evaluate(&self, batch: &ScoreBatch) -> Result<f32, LossError> {
        self.check_batch(batch)?;

        let weight = rank_weight(self.violations(batch)) * self.aggregation.scale(batch.len());

        let total: f32 = izip!(batch.negative_scores, batch.negative_ratings)
            .map(|(&negative_score, &negative_rating)| {
                self.weighted_value(
                    self.explicit_weight(
                        batch.positive_rating,
                        self.resolve_rating(negative_rating),
                    ),
                    batch.positive_score,
                    negative_score,
                )
            })
            .sum();

        Self::check_loss(weight * total)
    }

    /// Compute the loss of a batch and its derivatives with respect to the
    /// positive and negative scores.
    pub fn loss_and_gradient(&self, batch: &ScoreBatch) -> Result<LossGradient, LossError> {
        self.validate()?;
        self.check_batch(batch)?;

        let violations = self.violations(batch);
        let weight = rank_weight(violations) * self.aggregation.scale(batch.len());

        let mut loss = 0.0;
        let mut negatives = Vec::with_capacity(batch.len());

        for (&negative_score, &negative_rating) in
            izip!(batch.negative_scores, batch.negative_ratings)
        {
            let explicit_weight =
                self.explicit_weight(batch.positive_rating, self.resolve_rating(negative_rating));

            loss += self.weighted_value(explicit_weight, batch.positive_score, negative_score);
            negatives.push(
                weight
                    * explicit_weight
                    * self.pairwise_loss.derivative(
                        self.margin,
                        batch.positive_score,
                        negative_score,
                    ),
            );
        }

        let loss = Self::check_loss(weight * loss)?;
        let positive = -negatives.iter().sum::<f32>();

        trace!(
            violations,
            num_negatives = batch.len(),
            loss,
            "explicit WARP loss"
        );

        Ok(LossGradient {
            loss,
            positive,
            negatives,
        })
    }

    /// Compute the losses of independent batches in parallel.
    pub fn batch_losses(&self, batches: &[ScoreBatch]) -> Result<Vec<f32>, LossError> {
        self.validate()?;

        let losses = batches
            .par_iter()
            .map(|batch| self.evaluate(batch))
            .collect::<Result<Vec<_>, _>>();

        match losses {
            Ok(ref losses) => debug!(num_examples = losses.len(), "computed batch losses"),
            Err(ref error) => warn!(%error, "rejected loss batch"),
        }

        losses
    }

    /// Mean loss over independent batches.
    pub fn mean_loss(&self, batches: &[ScoreBatch]) -> Result<f32, LossError> {
        if batches.is_empty() {
            return Err(LossError::EmptyBatch);
        }

        let losses = self.batch_losses(batches)?;

        Ok(losses.iter().sum::<f32>() / losses.len() as f32)
    }

    /// Compute per-example losses from dense arrays, one row per example:
    /// positive scores and ratings of shape `(n,)`, negative scores and
    /// ratings of shape `(n, k)`.
    pub fn dense_losses(
        &self,
        positive_scores: ArrayView1<f32>,
        positive_ratings: ArrayView1<Rating>,
        negative_scores: ArrayView2<f32>,
        negative_ratings: ArrayView2<Option<Rating>>,
    ) -> Result<Array1<f32>, LossError> {
        let num_examples = positive_scores.len();

        if positive_ratings.len() != num_examples {
            return Err(LossError::ShapeMismatch(format!(
                "{} positive scores but {} positive ratings",
                num_examples,
                positive_ratings.len()
            )));
        }

        if negative_scores.nrows() != num_examples {
            return Err(LossError::ShapeMismatch(format!(
                "{} positive scores but {} rows of negative scores",
                num_examples,
                negative_scores.nrows()
            )));
        }

        if negative_scores.dim() != negative_ratings.dim() {
            return Err(LossError::ShapeMismatch(format!(
                "negative scores of shape {:?} but negative ratings of shape {:?}",
                negative_scores.dim(),
                negative_ratings.dim()
            )));
        }

        self.validate()?;

        let losses = (0..num_examples)
            .into_par_iter()
            .map(|idx| {
                let score_row = negative_scores.row(idx);
                let rating_row = negative_ratings.row(idx);

                let scores = score_row
                    .as_slice()
                    .map_or_else(|| Cow::Owned(score_row.to_vec()), Cow::Borrowed);
                let ratings = rating_row
                    .as_slice()
                    .map_or_else(|| Cow::Owned(rating_row.to_vec()), Cow::Borrowed);

                self.evaluate(&ScoreBatch::new(
                    positive_scores[idx],
                    positive_ratings[idx],
                    &scores,
                    &ratings,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(num_examples, "computed dense losses");

        Ok(Array1::from(losses))
    }
}
