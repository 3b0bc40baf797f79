//! The order state machine.
//!
//! Every status change in the crate, user-driven or swept, is decided here: [`EventKind::rule`]
//! is the table of who may do what from which status, and [`decide`] turns a snapshot plus an
//! event into the commit the store applies atomically and the notices sent after it.

use super::actor::{Actor, Role};
use super::delivery::{Delivery, DeliveryDraft};
use super::dispute::{Dispute, Resolution};
use super::money::Balance;
use super::notification::Notice;
use super::order::OrderStatus::{self, *};
use super::ports::{DisputeWrite, EarningsCredit, OrderCommit, OrderSnapshot};
use super::review::{Rating, Review};
use crate::error::{MarketError, Rejection, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::fmt;

pub const OVERDUE_NOTE: &str = "Deadline crossed. Order marked overdue automatically.";

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ConfirmPayment { payment_ref: String },
    StartWork,
    SubmitDelivery(DeliveryDraft),
    RequestRevision { reason: Option<String> },
    Complete,
    RaiseDispute { reason: String },
    Resolve {
        resolution: Resolution,
        note: Option<String>,
    },
    MarkOverdue { today: NaiveDate },
    ExtendDeadline {
        deadline: NaiveDate,
        today: NaiveDate,
    },
    Cancel { reason: Option<String> },
    LeaveReview {
        rating: Rating,
        comment: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConfirmPayment,
    StartWork,
    SubmitDelivery,
    RequestRevision,
    Complete,
    RaiseDispute,
    Resolve,
    MarkOverdue,
    ExtendDeadline,
    Cancel,
    LeaveReview,
}

/// Which side of an order may trigger a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Buyer,
    Seller,
    Arbiter,
    System,
}

impl Party {
    pub fn permits(&self, actor: &Actor, order: &super::order::Order) -> bool {
        match self {
            Party::Buyer => actor.is_buyer_of(order),
            Party::Seller => actor.is_seller_of(order),
            Party::Arbiter => actor.role == Role::Arbiter,
            Party::System => actor.role == Role::System,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub party: Party,
    pub from: &'static [OrderStatus],
    pub to: OrderStatus,
}

impl Rule {
    const fn new(party: Party, from: &'static [OrderStatus], to: OrderStatus) -> Self {
        Self { party, from, to }
    }
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::ConfirmPayment,
        EventKind::StartWork,
        EventKind::SubmitDelivery,
        EventKind::RequestRevision,
        EventKind::Complete,
        EventKind::RaiseDispute,
        EventKind::Resolve,
        EventKind::MarkOverdue,
        EventKind::ExtendDeadline,
        EventKind::Cancel,
        EventKind::LeaveReview,
    ];

    /// The transition table.
    pub const fn rule(self) -> Rule {
        match self {
            EventKind::ConfirmPayment => Rule::new(Party::Buyer, &[Pending], Paid),
            EventKind::StartWork => Rule::new(Party::Seller, &[Paid], InProgress),
            EventKind::SubmitDelivery => {
                Rule::new(Party::Seller, &[InProgress, Revision], Submitted)
            }
            EventKind::RequestRevision => Rule::new(Party::Buyer, &[Submitted], Revision),
            EventKind::Complete => Rule::new(Party::Buyer, &[Submitted], Completed),
            EventKind::RaiseDispute => Rule::new(Party::Buyer, &[Submitted], Disputed),
            EventKind::Resolve => Rule::new(Party::Arbiter, &[Disputed], Completed),
            EventKind::MarkOverdue => Rule::new(Party::System, &OrderStatus::ACTIVE, Overdue),
            EventKind::ExtendDeadline => Rule::new(
                Party::Buyer,
                &[Paid, InProgress, Revision, Submitted, Overdue],
                InProgress,
            ),
            EventKind::Cancel => Rule::new(Party::Buyer, &[Pending, Paid, Overdue], Cancelled),
            EventKind::LeaveReview => Rule::new(Party::Buyer, &[Completed], Completed),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ConfirmPayment => "confirm payment for",
            EventKind::StartWork => "start",
            EventKind::SubmitDelivery => "deliver",
            EventKind::RequestRevision => "request revision on",
            EventKind::Complete => "complete",
            EventKind::RaiseDispute => "dispute",
            EventKind::Resolve => "resolve",
            EventKind::MarkOverdue => "mark overdue",
            EventKind::ExtendDeadline => "extend",
            EventKind::Cancel => "cancel",
            EventKind::LeaveReview => "review",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ConfirmPayment { .. } => EventKind::ConfirmPayment,
            Event::StartWork => EventKind::StartWork,
            Event::SubmitDelivery(_) => EventKind::SubmitDelivery,
            Event::RequestRevision { .. } => EventKind::RequestRevision,
            Event::Complete => EventKind::Complete,
            Event::RaiseDispute { .. } => EventKind::RaiseDispute,
            Event::Resolve { .. } => EventKind::Resolve,
            Event::MarkOverdue { .. } => EventKind::MarkOverdue,
            Event::ExtendDeadline { .. } => EventKind::ExtendDeadline,
            Event::Cancel { .. } => EventKind::Cancel,
            Event::LeaveReview { .. } => EventKind::LeaveReview,
        }
    }
}

/// Business parameters the table needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub penalty_rate: Decimal,
}

/// Money moved by a committed transition, for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Settlement {
    Funded(Balance),
    Released(Balance),
    Refunded(Balance),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub commit: OrderCommit,
    pub notices: Vec<Notice>,
    pub settlement: Option<Settlement>,
}

/// Validates `event` against the table and computes its effects.
///
/// Pure: nothing is written. Permission is checked before status, so a stranger learns nothing
/// about an order's state.
pub fn decide(
    snapshot: &OrderSnapshot,
    actor: &Actor,
    event: &Event,
    policy: &Policy,
    now: DateTime<Utc>,
) -> Result<Decision> {
    let current = &snapshot.order;
    let kind = event.kind();
    let rule = kind.rule();

    if !rule.party.permits(actor, current) {
        return Err(MarketError::NotPermitted(format!(
            "{actor} may not {kind} order {}",
            current.id
        )));
    }
    if !rule.from.contains(&current.status) {
        return Err(Rejection::InvalidStatus {
            event: kind.as_str(),
            status: current.status,
        }
        .into());
    }

    let mut commit = OrderCommit::new(current.version, current.clone());
    let order = &mut commit.order;
    order.status = rule.to;
    let id = order.id;
    let mut notices = Vec::new();
    let mut settlement = None;

    match event {
        Event::ConfirmPayment { payment_ref } => {
            order.payment_ref = Some(payment_ref.clone());
            order.fund_escrow();
            settlement = Some(Settlement::Funded(order.escrow_amount));
        }
        Event::StartWork => {
            order.started_at.get_or_insert(now);
        }
        Event::SubmitDelivery(draft) => {
            commit.delivery = Some(Delivery::from_draft(
                id,
                snapshot.latest_delivery,
                draft.clone(),
                now,
            ));
            notices.push(Notice::about(
                order.buyer,
                id,
                format!("New delivery submitted for {}", order.title),
            ));
        }
        Event::RequestRevision { reason } => {
            if !current.can_request_revision() {
                return Err(Rejection::RevisionLimitReached {
                    max: current.max_revisions,
                }
                .into());
            }
            order.revision_count += 1;
            order.revision_reason = reason.clone();
            notices.push(Notice::about(
                order.seller,
                id,
                format!("Revision requested for {}", order.title),
            ));
        }
        Event::Complete => {
            let payout = order.release_escrow().ok_or(Rejection::AlreadyReleased)?;
            commit.credit = Some(EarningsCredit {
                seller: order.seller,
                amount: payout,
            });
            settlement = Some(Settlement::Released(payout));
            order.completed_at = Some(now);
            notices.push(Notice::about(
                order.seller,
                id,
                format!("Order completed and payment released for {}", order.title),
            ));
        }
        Event::RaiseDispute { reason } => {
            if snapshot.dispute.is_some() {
                return Err(Rejection::DisputeExists.into());
            }
            commit.dispute = Some(DisputeWrite::Open(Dispute::open(
                id,
                actor.user,
                reason.clone(),
                now,
            )));
            notices.push(Notice::about(
                order.seller,
                id,
                format!("A dispute was raised on {}", order.title),
            ));
        }
        Event::Resolve { resolution, note } => {
            let mut dispute = snapshot.dispute.clone().ok_or(Rejection::NoOpenDispute)?;
            if dispute.is_resolved {
                return Err(Rejection::DisputeResolved.into());
            }
            match resolution {
                Resolution::Refund => {
                    settlement = Some(Settlement::Refunded(order.forfeit_escrow()));
                }
                Resolution::Release => {
                    let payout = order.release_escrow().ok_or(Rejection::AlreadyReleased)?;
                    commit.credit = Some(EarningsCredit {
                        seller: order.seller,
                        amount: payout,
                    });
                    settlement = Some(Settlement::Released(payout));
                }
            }
            dispute.resolve(*resolution, note.clone(), now);
            commit.dispute = Some(DisputeWrite::Resolve(dispute));
            order.completed_at = Some(now);
            for party in [order.buyer, order.seller] {
                notices.push(Notice::about(
                    party,
                    id,
                    format!("Dispute resolved ({resolution}) for {}", order.title),
                ));
            }
        }
        Event::MarkOverdue { today } => {
            if current.is_overdue || !current.is_past_deadline(*today) {
                return Err(Rejection::NotOverdue.into());
            }
            order.apply_penalty(policy.penalty_rate);
            order.system_note = Some(OVERDUE_NOTE.to_string());
            notices.push(Notice::about(
                order.buyer,
                id,
                format!("Order overdue: {}", order.title),
            ));
            notices.push(Notice::about(
                order.seller,
                id,
                format!("You missed deadline for {}", order.title),
            ));
        }
        Event::ExtendDeadline { deadline, today } => {
            if deadline < today {
                return Err(MarketError::ValidationError(format!(
                    "New deadline {deadline} is in the past"
                )));
            }
            order.deadline = Some(*deadline);
            order.started_at.get_or_insert(now);
            order.is_overdue = false;
            order.penalty_amount = Balance::ZERO;
            notices.push(Notice::about(
                order.seller,
                id,
                format!("Deadline extended for {}", order.title),
            ));
        }
        Event::Cancel { reason } => {
            let refunded = order.forfeit_escrow();
            if !refunded.is_zero() {
                settlement = Some(Settlement::Refunded(refunded));
            }
            order.cancelled_at = Some(now);
            order.cancellation_reason = reason.clone();
            notices.push(Notice::about(
                order.seller,
                id,
                format!("Order cancelled: {}", order.title),
            ));
        }
        Event::LeaveReview { rating, comment } => {
            if snapshot.has_review {
                return Err(Rejection::ReviewExists.into());
            }
            commit.review = Some(Review {
                order: id,
                seller: order.seller,
                buyer: order.buyer,
                rating: *rating,
                comment: comment.clone(),
                created_at: now,
            });
        }
    }

    Ok(Decision {
        commit,
        notices,
        settlement,
    })
}
