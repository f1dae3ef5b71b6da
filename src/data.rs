//! Interactions and the compressed rating store used to resolve the
//! ratings of sampled negatives.
use std::cmp::Ordering;
use std::mem;

use tracing::debug;

use super::{ItemId, Rating, UserId};

/// A single (user, item) interaction, optionally carrying an explicit rating.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Interaction {
    user_id: UserId,
    item_id: ItemId,
    rating: Option<Rating>,
}

impl Interaction {
    /// Build a new interaction. Interactions without a rating record that
    /// the user saw the item without grading it.
    pub fn new(user_id: UserId, item_id: ItemId, rating: Option<Rating>) -> Self {
        Interaction {
            user_id,
            item_id,
            rating,
        }
    }

    /// The interacting user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The item interacted with.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// The explicit rating, if one was given.
    pub fn rating(&self) -> Option<Rating> {
        self.rating
    }
}

/// How to fill in the rating of a sampled negative the user never rated.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnknownRating {
    /// Leave the rating unknown; the loss substitutes its constant `r_unknown`.
    Constant,
    /// Use the mean rating the user gave to other items.
    UserMean,
    /// Use the mean rating the item received from other users.
    ItemMean,
}

impl Default for UnknownRating {
    fn default() -> Self {
        UnknownRating::Constant
    }
}

/// An unordered collection of interactions.
#[derive(Clone, Debug, Default)]
pub struct Interactions {
    num_users: usize,
    num_items: usize,
    interactions: Vec<Interaction>,
}

impl Interactions {
    /// Create an empty collection with the given catalogue sizes.
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Interactions {
            num_users,
            num_items,
            interactions: Vec::new(),
        }
    }

    /// Add an interaction, growing the catalogue sizes if necessary.
    pub fn push(&mut self, interaction: Interaction) {
        self.num_users = self.num_users.max(interaction.user_id().saturating_add(1));
        self.num_items = self.num_items.max(interaction.item_id().saturating_add(1));
        self.interactions.push(interaction);
    }

    /// The raw interactions.
    pub fn data(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Number of interactions.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether there are no interactions.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// (users, items).
    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_items)
    }

    /// Convert into the compressed rating store.
    pub fn to_compressed(&self) -> CompressedRatings {
        CompressedRatings::from(self)
    }
}

impl From<Vec<Interaction>> for Interactions {
    fn from(data: Vec<Interaction>) -> Interactions {
        let num_users = data
            .iter()
            .map(|x| x.user_id().saturating_add(1))
            .max()
            .unwrap_or(0);
        let num_items = data
            .iter()
            .map(|x| x.item_id().saturating_add(1))
            .max()
            .unwrap_or(0);

        Interactions {
            num_users,
            num_items,
            interactions: data,
        }
    }
}

fn cmp_item(x: &Interaction, y: &Interaction) -> Ordering {
    x.user_id()
        .cmp(&y.user_id())
        .then_with(|| x.item_id().cmp(&y.item_id()))
}

fn mean(ratings: impl Iterator<Item = Rating>) -> Option<Rating> {
    let (sum, count) = ratings.fold((0.0, 0usize), |(sum, count), rating| {
        (sum + rating as f64, count + 1)
    });

    if count == 0 {
        None
    } else {
        Some((sum / count as f64) as Rating)
    }
}

/// User-major compressed store of interactions, sorted by item id within
/// each user so that ratings can be looked up by binary search.
///
/// When the same (user, item) pair occurs more than once, the last
/// occurrence wins.
#[derive(Clone, Debug)]
pub struct CompressedRatings {
    num_users: usize,
    num_items: usize,
    user_pointers: Vec<usize>,
    item_ids: Vec<ItemId>,
    ratings: Vec<Option<Rating>>,
    item_means: Vec<Option<Rating>>,
}

impl<'a> From<&'a Interactions> for CompressedRatings {
    fn from(interactions: &Interactions) -> CompressedRatings {
        let mut data = interactions.data().to_owned();

        // Stable sort, so duplicates stay in insertion order.
        data.sort_by(cmp_item);
        data.dedup_by(|later, earlier| {
            let duplicate = cmp_item(later, earlier) == Ordering::Equal;
            if duplicate {
                mem::swap(later, earlier);
            }
            duplicate
        });

        let mut user_pointers = vec![0; interactions.num_users + 1];
        let mut item_ids = Vec::with_capacity(data.len());
        let mut ratings = Vec::with_capacity(data.len());

        let mut item_sums = vec![(0.0_f64, 0_usize); interactions.num_items];

        for datum in &data {
            item_ids.push(datum.item_id());
            ratings.push(datum.rating());

            user_pointers[datum.user_id() + 1] += 1;

            if let Some(rating) = datum.rating() {
                let entry = &mut item_sums[datum.item_id()];
                entry.0 += rating as f64;
                entry.1 += 1;
            }
        }

        for idx in 1..user_pointers.len() {
            user_pointers[idx] += user_pointers[idx - 1];
        }

        let item_means = item_sums
            .into_iter()
            .map(|(sum, count)| {
                if count == 0 {
                    None
                } else {
                    Some((sum / count as f64) as Rating)
                }
            })
            .collect();

        debug!(
            num_users = interactions.num_users,
            num_items = interactions.num_items,
            num_interactions = item_ids.len(),
            "compressed ratings"
        );

        CompressedRatings {
            num_users: interactions.num_users,
            num_items: interactions.num_items,
            user_pointers,
            item_ids,
            ratings,
            item_means,
        }
    }
}

impl CompressedRatings {
    /// Iterate over all users, including those without interactions.
    pub fn iter_users(&self) -> CompressedRatingsUserIterator {
        CompressedRatingsUserIterator {
            ratings: self,
            idx: 0,
        }
    }

    /// Interactions of a single user, or `None` if the user is unknown.
    pub fn get_user(&self, user_id: UserId) -> Option<CompressedRatingsUser> {
        if user_id >= self.num_users {
            return None;
        }

        let start = self.user_pointers[user_id];
        let stop = self.user_pointers[user_id + 1];

        Some(CompressedRatingsUser {
            user_id,
            item_ids: &self.item_ids[start..stop],
            ratings: &self.ratings[start..stop],
        })
    }

    /// Whether the user interacted with the item, rated or not.
    pub fn has_interaction(&self, user_id: UserId, item_id: ItemId) -> bool {
        self.get_user(user_id)
            .map_or(false, |user| user.item_ids.binary_search(&item_id).is_ok())
    }

    /// The rating the user gave the item, if any.
    pub fn rating(&self, user_id: UserId, item_id: ItemId) -> Option<Rating> {
        let user = self.get_user(user_id)?;

        user.item_ids
            .binary_search(&item_id)
            .ok()
            .and_then(|idx| user.ratings[idx])
    }

    /// Mean rating given by the user, ignoring unrated interactions.
    pub fn user_mean(&self, user_id: UserId) -> Option<Rating> {
        let user = self.get_user(user_id)?;

        mean(user.ratings.iter().filter_map(|&rating| rating))
    }

    /// Mean rating received by the item, ignoring unrated interactions.
    pub fn item_mean(&self, item_id: ItemId) -> Option<Rating> {
        self.item_means.get(item_id).cloned().flatten()
    }

    /// Mean of all ratings in the store.
    pub fn global_mean(&self) -> Option<Rating> {
        mean(self.ratings.iter().filter_map(|&rating| rating))
    }

    /// Ratings of `item_ids` for `user_id`, ready to accompany the items'
    /// scores in a loss batch.
    ///
    /// Observed ratings are returned as is. Missing ratings are filled in
    /// according to `strategy`; when the strategy has no mean to offer (or
    /// is [`UnknownRating::Constant`]), the rating stays unknown.
    pub fn negative_ratings(
        &self,
        user_id: UserId,
        item_ids: &[ItemId],
        strategy: &UnknownRating,
    ) -> Vec<Option<Rating>> {
        let user_mean = match *strategy {
            UnknownRating::UserMean => self.user_mean(user_id),
            _ => None,
        };

        item_ids
            .iter()
            .map(|&item_id| {
                self.rating(user_id, item_id)
                    .or_else(|| match *strategy {
                        UnknownRating::Constant => None,
                        UnknownRating::UserMean => user_mean,
                        UnknownRating::ItemMean => self.item_mean(item_id),
                    })
            })
            .collect()
    }

    /// Number of stored interactions.
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether the store holds no interactions.
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// (users, items).
    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_items)
    }
}

/// Iterator over the users of a [`CompressedRatings`] store.
pub struct CompressedRatingsUserIterator<'a> {
    ratings: &'a CompressedRatings,
    idx: usize,
}

/// The interactions of a single user, sorted by item id.
#[derive(Debug)]
pub struct CompressedRatingsUser<'a> {
    /// The user.
    pub user_id: UserId,
    /// Items the user interacted with.
    pub item_ids: &'a [ItemId],
    /// Ratings of those items, `None` where unrated.
    pub ratings: &'a [Option<Rating>],
}

impl<'a> CompressedRatingsUser<'a> {
    /// Number of interactions.
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether the user has no interactions.
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

impl<'a> Iterator for CompressedRatingsUserIterator<'a> {
    type Item = CompressedRatingsUser<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        let value = self.ratings.get_user(self.idx);

        self.idx += 1;

        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interactions() -> Interactions {
        Interactions::from(vec![
            Interaction::new(0, 3, Some(4.0)),
            Interaction::new(0, 1, Some(2.0)),
            Interaction::new(0, 2, None),
            Interaction::new(2, 1, Some(5.0)),
            Interaction::new(2, 0, Some(1.0)),
        ])
    }

    #[test]
    fn shape_from_interactions() {
        let data = interactions();

        assert_eq!(data.shape(), (3, 4));
        assert_eq!(data.len(), 5);
        assert_eq!(Interactions::from(Vec::new()).shape(), (0, 0));
    }

    #[test]
    fn push_grows_catalogue() {
        let mut data = Interactions::new(1, 1);
        data.push(Interaction::new(4, 7, None));

        assert_eq!(data.shape(), (5, 8));
    }

    #[test]
    fn extreme_ids_saturate_catalogue() {
        let mut data = Interactions::new(0, 0);
        data.push(Interaction::new(usize::MAX, 0, None));
        assert_eq!(data.shape(), (usize::MAX, 1));

        let data = Interactions::from(vec![Interaction::new(0, usize::MAX, Some(1.0))]);
        assert_eq!(data.shape(), (1, usize::MAX));
    }

    #[test]
    fn users_are_sorted_by_item() {
        let ratings = interactions().to_compressed();
        let users: Vec<_> = ratings.iter_users().collect();

        assert_eq!(users.len(), 3);
        assert_eq!(users[0].item_ids, &[1, 2, 3]);
        assert_eq!(users[0].ratings, &[Some(2.0), None, Some(4.0)]);
        assert!(users[1].is_empty());
        assert_eq!(users[2].item_ids, &[0, 1]);
        assert!(ratings.get_user(3).is_none());
    }

    #[test]
    fn rating_lookup() {
        let ratings = interactions().to_compressed();

        assert_eq!(ratings.rating(0, 3), Some(4.0));
        assert_eq!(ratings.rating(0, 2), None);
        assert!(ratings.has_interaction(0, 2));
        assert!(!ratings.has_interaction(0, 0));
        assert_eq!(ratings.rating(1, 0), None);
        assert_eq!(ratings.rating(17, 0), None);
    }

    #[test]
    fn duplicates_keep_last_rating() {
        let ratings = Interactions::from(vec![
            Interaction::new(0, 0, Some(1.0)),
            Interaction::new(0, 0, Some(3.0)),
        ])
        .to_compressed();

        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings.rating(0, 0), Some(3.0));
    }

    #[test]
    fn means() {
        let ratings = interactions().to_compressed();

        assert_eq!(ratings.user_mean(0), Some(3.0));
        assert_eq!(ratings.user_mean(1), None);
        assert_eq!(ratings.item_mean(1), Some(3.5));
        assert_eq!(ratings.item_mean(2), None);
        assert_eq!(ratings.item_mean(99), None);
        assert_eq!(ratings.global_mean(), Some(3.0));
    }

    #[test]
    fn negative_ratings_strategies() {
        let ratings = interactions().to_compressed();
        let items = [1, 0, 2];

        assert_eq!(
            ratings.negative_ratings(0, &items, &UnknownRating::Constant),
            vec![Some(2.0), None, None]
        );
        assert_eq!(
            ratings.negative_ratings(0, &items, &UnknownRating::UserMean),
            vec![Some(2.0), Some(3.0), Some(3.0)]
        );
        assert_eq!(
            ratings.negative_ratings(0, &items, &UnknownRating::ItemMean),
            vec![Some(2.0), Some(1.0), None]
        );
        assert_eq!(
            ratings.negative_ratings(1, &items, &UnknownRating::UserMean),
            vec![None, None, None]
        );
    }
}
