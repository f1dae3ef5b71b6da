//! Uniform negative sampling for batch losses.
use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use tracing::trace;

use crate::data::{CompressedRatings, UnknownRating};
use crate::{ItemId, Rating, SamplingError, UserId};

/// Draws batches of negative items uniformly from the catalogue,
/// never returning the positive item itself.
#[derive(Clone, Debug)]
pub struct NegativeSampler {
    num_items: usize,
    // One fewer than the catalogue: draws at or above the positive are shifted up by one.
    item_range: Uniform<usize>,
    rng: XorShiftRng,
}

impl NegativeSampler {
    /// Build a sampler over `num_items` items.
    pub fn new(num_items: usize) -> Result<Self, SamplingError> {
        if num_items < 2 {
            return Err(SamplingError::NotEnoughItems(num_items));
        }

        Ok(NegativeSampler {
            num_items,
            item_range: Uniform::new(0, num_items - 1),
            rng: XorShiftRng::from_seed(rand::thread_rng().gen()),
        })
    }

    /// Set the random number generator.
    pub fn rng(mut self, rng: XorShiftRng) -> Self {
        self.rng = rng;
        self
    }

    /// Set the random number generator from seed.
    pub fn from_seed(mut self, seed: [u8; 16]) -> Self {
        self.rng = XorShiftRng::from_seed(seed);
        self
    }

    /// Number of items in the catalogue.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Sample `num_negatives` items, with replacement, excluding `positive`.
    pub fn sample(
        &mut self,
        positive: ItemId,
        num_negatives: usize,
    ) -> Result<Vec<ItemId>, SamplingError> {
        if positive >= self.num_items {
            return Err(SamplingError::UnknownItem {
                item_id: positive,
                num_items: self.num_items,
            });
        }

        let item_range = &self.item_range;
        let rng = &mut self.rng;

        Ok((0..num_negatives)
            .map(|_| {
                let item_id = item_range.sample(rng);
                if item_id >= positive {
                    item_id + 1
                } else {
                    item_id
                }
            })
            .collect())
    }

    /// Sample negatives for `user_id` and look up their ratings, filling
    /// in unrated ones according to `strategy`.
    pub fn sample_batch(
        &mut self,
        ratings: &CompressedRatings,
        user_id: UserId,
        positive: ItemId,
        num_negatives: usize,
        strategy: &UnknownRating,
    ) -> Result<(Vec<ItemId>, Vec<Option<Rating>>), SamplingError> {
        let item_ids = self.sample(positive, num_negatives)?;
        let negative_ratings = ratings.negative_ratings(user_id, &item_ids, strategy);

        trace!(
            user_id,
            positive,
            num_negatives,
            num_rated = negative_ratings.iter().filter(|x| x.is_some()).count(),
            "sampled negatives"
        );

        Ok((item_ids, negative_ratings))
    }
}
