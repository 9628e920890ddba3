use parking_lot::RwLock;
use std::collections::HashMap;

/// Running score aggregate for one laptop
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rating {
    pub count: u32,
    pub sum: f64,
}

impl Rating {
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / f64::from(self.count)
        }
    }
}

pub trait RatingStore: Send + Sync {
    /// Add a score and return the updated aggregate.
    fn add(&self, laptop_id: &str, score: f64) -> Rating;
}

#[derive(Default)]
pub struct InMemoryRatingStore {
    ratings: RwLock<HashMap<String, Rating>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, laptop_id: &str) -> Option<Rating> {
        self.ratings.read().get(laptop_id).copied()
    }
}

impl RatingStore for InMemoryRatingStore {
    fn add(&self, laptop_id: &str, score: f64) -> Rating {
        let mut ratings = self.ratings.write();
        let rating = ratings.entry(laptop_id.to_string()).or_default();

        rating.count = rating.count.saturating_add(1);
        rating.sum += score;

        *rating
    }
}
