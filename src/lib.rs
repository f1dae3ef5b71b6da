#![deny(missing_docs)]
//! # acf
//!
//! `acf` implements the training objective of an attentive collaborative
//! filtering recommender fitted on explicit (rated) feedback: a batch
//! variant of the WARP ranking loss whose penalty grows with the number of
//! sampled negatives that outrank the positive item, and with the gap
//! between the positive rating and the negatives' ratings.
//!
//! ## Example
//! Score a positive item against a batch of sampled negatives:
//!
//! ```rust
//! # extern crate acf;
//! use acf::data::{Interaction, Interactions, UnknownRating};
//! use acf::losses::{ExplicitWarpLoss, ScoreBatch};
//! use acf::sampling::NegativeSampler;
//!
//! let interactions = Interactions::from(vec![
//!     Interaction::new(0, 0, Some(4.0)),
//!     Interaction::new(0, 1, Some(2.0)),
//!     Interaction::new(1, 2, Some(5.0)),
//!     Interaction::new(1, 3, None),
//! ]);
//! let ratings = interactions.to_compressed();
//!
//! let mut sampler = NegativeSampler::new(ratings.num_items())
//!     .unwrap()
//!     .from_seed([42; 16]);
//! let (item_ids, negative_ratings) = sampler
//!     .sample_batch(&ratings, 0, 0, 3, &UnknownRating::Constant)
//!     .unwrap();
//!
//! // Scores come from the model being trained.
//! let negative_scores: Vec<f32> = item_ids.iter().map(|&item| item as f32).collect();
//!
//! let loss = ExplicitWarpLoss::new(5.0, 3.0).margin(1.0);
//! let batch = ScoreBatch::new(1.5, 4.0, &negative_scores, &negative_ratings);
//!
//! let value = loss.loss(&batch).unwrap();
//! assert!(value >= 0.0);
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate failure;
extern crate ndarray;
extern crate rand;
extern crate rand_xorshift;
extern crate rayon;
extern crate serde;
extern crate tracing;

pub mod data;
pub mod losses;
pub mod sampling;

/// Alias for user indices.
pub type UserId = usize;
/// Alias for item indices.
pub type ItemId = usize;
/// Alias for explicit ratings.
pub type Rating = f32;

/// Loss computation error types.
#[derive(Debug, Fail, PartialEq)]
pub enum LossError {
    /// No negatives were supplied for the positive item.
    #[fail(display = "Negative batch is empty.")]
    EmptyBatch,
    /// The maximum rating is not a positive finite number.
    #[fail(display = "Maximum rating must be positive and finite, got {}.", _0)]
    InvalidMaxRating(Rating),
    /// The fallback rating for unknown negatives lies outside the rating scale.
    #[fail(display = "Unknown-rating fallback {} outside [0, {}].", rating, r_max)]
    InvalidUnknownRating {
        /// Offending fallback rating.
        rating: Rating,
        /// Maximum rating of the scale.
        r_max: Rating,
    },
    /// The margin is negative or not finite.
    #[fail(display = "Margin must be non-negative and finite, got {}.", _0)]
    InvalidMargin(f32),
    /// A positive or negative rating lies outside the rating scale.
    #[fail(display = "Rating {} outside [0, {}].", rating, r_max)]
    RatingOutOfRange {
        /// Offending rating.
        rating: Rating,
        /// Maximum rating of the scale.
        r_max: Rating,
    },
    /// Negative scores and negative ratings differ in length.
    #[fail(
        display = "Got {} negative scores but {} negative ratings.",
        scores, ratings
    )]
    LengthMismatch {
        /// Number of negative scores.
        scores: usize,
        /// Number of negative ratings.
        ratings: usize,
    },
    /// A model score is infinite or not a number.
    #[fail(display = "Invalid score value: non-finite or not a number.")]
    NonFiniteScore,
    /// Scores are finite but far enough apart that the loss overflows.
    #[fail(display = "Loss overflowed: scores too far apart.")]
    NonFiniteLoss,
    /// Dense inputs disagree on the number of examples or negatives.
    #[fail(display = "Inconsistent dense input shapes: {}.", _0)]
    ShapeMismatch(String),
}

/// Negative sampling error types.
#[derive(Debug, Fail, PartialEq)]
pub enum SamplingError {
    /// Sampling a negative distinct from the positive needs at least two items.
    #[fail(display = "Need at least two items to sample negatives, got {}.", _0)]
    NotEnoughItems(usize),
    /// The positive item is not part of the item catalogue.
    #[fail(display = "Item {} outside catalogue of {} items.", item_id, num_items)]
    UnknownItem {
        /// Offending item.
        item_id: ItemId,
        /// Size of the item catalogue.
        num_items: usize,
    },
}
