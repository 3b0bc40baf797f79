use super::money::Balance;
use super::order::{OrderId, UserId};
use crate::error::MarketError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A star rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn new(stars: u8) -> Result<Self, MarketError> {
        if (1..=5).contains(&stars) {
            Ok(Self(stars))
        } else {
            Err(MarketError::ValidationError(format!(
                "Rating must be between 1 and 5, got {stars}"
            )))
        }
    }

    pub fn stars(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = MarketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// At most one per order, only for completed orders. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub order: OrderId,
    pub seller: UserId,
    pub buyer: UserId,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The seller's earnings ledger and the rating view derived from their reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerProfile {
    pub seller: UserId,
    pub total_earnings: Balance,
    /// Mean of all review ratings, one decimal place. Zero until the first review.
    pub rating: Decimal,
    pub review_count: u32,
}

impl SellerProfile {
    pub fn new(seller: UserId) -> Self {
        Self {
            seller,
            total_earnings: Balance::ZERO,
            rating: Decimal::ZERO,
            review_count: 0,
        }
    }

    pub fn credit(&mut self, amount: Balance) {
        self.total_earnings += amount;
    }

    /// Replaces the rating view with the mean of the full review log.
    pub fn recompute_rating(&mut self, ratings: &[Rating]) {
        self.rating = mean_rating(ratings);
        self.review_count = ratings.len() as u32;
    }
}

/// Arithmetic mean rounded to one decimal place.
pub fn mean_rating(ratings: &[Rating]) -> Decimal {
    if ratings.is_empty() {
        return Decimal::ZERO;
    }
    let sum: u64 = ratings.iter().map(|r| u64::from(r.stars())).sum();
    (Decimal::from(sum) / Decimal::from(ratings.len() as u64)).round_dp(1)
}
