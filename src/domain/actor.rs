use super::order::{Order, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Arbiter,
    /// Automated callers such as the overdue sweep.
    System,
}

/// The (user, role) pair every engine call is made on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user: UserId,
    pub role: Role,
}

impl Actor {
    pub fn buyer(user: UserId) -> Self {
        Self {
            user,
            role: Role::Buyer,
        }
    }

    pub fn seller(user: UserId) -> Self {
        Self {
            user,
            role: Role::Seller,
        }
    }

    pub fn arbiter(user: UserId) -> Self {
        Self {
            user,
            role: Role::Arbiter,
        }
    }

    pub fn system() -> Self {
        Self {
            user: UserId(0),
            role: Role::System,
        }
    }

    pub fn is_buyer_of(&self, order: &Order) -> bool {
        self.role == Role::Buyer && self.user == order.buyer
    }

    pub fn is_seller_of(&self, order: &Order) -> bool {
        self.role == Role::Seller && self.user == order.seller
    }

    /// Either side of the order, regardless of the role claimed.
    pub fn is_party_to(&self, order: &Order) -> bool {
        self.user == order.buyer || self.user == order.seller
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.role, self.user)
    }
}
