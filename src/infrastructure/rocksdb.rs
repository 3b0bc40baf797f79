use crate::domain::delivery::Delivery;
use crate::domain::dispute::Dispute;
use crate::domain::message::Message;
use crate::domain::notification::Notification;
use crate::domain::order::{Gig, GigId, Order, OrderId, UserId};
use crate::domain::ports::{
    DisputeWrite, NotificationSink, OrderCommit, OrderFilter, OrderSnapshot, OrderStore,
};
use crate::domain::review::{Rating, Review, SellerProfile};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_GIGS: &str = "gigs";
pub const CF_ORDERS: &str = "orders";
/// Keyed by order id followed by the big-endian delivery version.
pub const CF_DELIVERIES: &str = "deliveries";
pub const CF_DISPUTES: &str = "disputes";
pub const CF_REVIEWS: &str = "reviews";
/// Keyed by order id followed by the time-ordered message id.
pub const CF_MESSAGES: &str = "messages";
/// Keyed by seller id followed by order id; the rating log seller ratings are derived from.
pub const CF_SELLER_RATINGS: &str = "seller_ratings";
pub const CF_SELLERS: &str = "sellers";
/// Keyed by recipient id followed by the time-ordered notification id.
pub const CF_NOTIFICATIONS: &str = "notifications";

const COLUMN_FAMILIES: [&str; 9] = [
    CF_GIGS,
    CF_ORDERS,
    CF_DELIVERIES,
    CF_DISPUTES,
    CF_REVIEWS,
    CF_MESSAGES,
    CF_SELLER_RATINGS,
    CF_SELLERS,
    CF_NOTIFICATIONS,
];

/// Lock stripes per table; an order, or a seller, always maps to the same stripe.
const LOCK_STRIPES: usize = 64;

/// A persistent store implementation using RocksDB.
///
/// Each entity lives in its own column family, serialized as JSON. A commit validates under the
/// order's stripe lock, plus the seller's stripe lock when earnings or a review are written, and
/// lands as a single `WriteBatch`, so the order row, its child records and the seller ledger
/// change together or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    stripes: Arc<Vec<Mutex<()>>>,
    seller_stripes: Arc<Vec<Mutex<()>>>,
    inbox: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any missing column
    /// families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            stripes: Arc::new((0..LOCK_STRIPES).map(|_| Mutex::new(())).collect()),
            seller_stripes: Arc::new((0..LOCK_STRIPES).map(|_| Mutex::new(())).collect()),
            inbox: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            MarketError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn stripe(&self, order_id: OrderId) -> &Mutex<()> {
        let bytes = order_id.as_bytes();
        &self.stripes[bytes[15] as usize % LOCK_STRIPES]
    }

    fn seller_stripe(&self, seller: UserId) -> &Mutex<()> {
        &self.seller_stripes[(seller.0 % LOCK_STRIPES as u64) as usize]
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn exists(&self, cf: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf)?;
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    /// All values whose key starts with `prefix`, in key order.
    fn scan_prefix<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf(cf)?;
        let mut values = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, prefix) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn scan_all<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn snapshot(&self, order: Order) -> Result<OrderSnapshot> {
        let key = order.id.as_bytes();
        let latest_delivery = self
            .scan_prefix::<Delivery>(CF_DELIVERIES, key)?
            .last()
            .map(|d| d.version);
        Ok(OrderSnapshot {
            dispute: self.read(CF_DISPUTES, key)?,
            has_review: self.exists(CF_REVIEWS, key)?,
            latest_delivery,
            order,
        })
    }

    /// Stages the seller side of a commit into `batch`. Caller holds the seller's stripe lock.
    fn stage_ledger(&self, commit: &OrderCommit, batch: &mut WriteBatch) -> Result<()> {
        let seller = commit.order.seller;
        let seller_key = seller.0.to_be_bytes();
        let mut profile = self
            .read::<SellerProfile>(CF_SELLERS, &seller_key)?
            .unwrap_or_else(|| SellerProfile::new(seller));

        if let Some(credit) = &commit.credit {
            profile.credit(credit.amount);
        }
        if let Some(review) = &commit.review {
            let mut ratings: Vec<Rating> = self.scan_prefix(CF_SELLER_RATINGS, &seller_key)?;
            ratings.push(review.rating);
            profile.recompute_rating(&ratings);
            batch.put_cf(
                self.cf(CF_SELLER_RATINGS)?,
                rating_key(seller, commit.order.id),
                serde_json::to_vec(&review.rating)?,
            );
        }
        batch.put_cf(self.cf(CF_SELLERS)?, seller_key, serde_json::to_vec(&profile)?);
        Ok(())
    }
}

fn delivery_key(order_id: OrderId, version: u32) -> Vec<u8> {
    let mut key = order_id.as_bytes().to_vec();
    key.extend_from_slice(&version.to_be_bytes());
    key
}

fn rating_key(seller: UserId, order_id: OrderId) -> Vec<u8> {
    let mut key = seller.0.to_be_bytes().to_vec();
    key.extend_from_slice(order_id.as_bytes());
    key
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn put_gig(&self, gig: Gig) -> Result<()> {
        self.write(CF_GIGS, &gig.id.0.to_be_bytes(), &gig)
    }

    async fn get_gig(&self, gig_id: GigId) -> Result<Option<Gig>> {
        self.read(CF_GIGS, &gig_id.0.to_be_bytes())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let _guard = self.stripe(order.id).lock().await;
        if self.exists(CF_ORDERS, order.id.as_bytes())? {
            return Err(MarketError::Duplicate {
                entity: "order",
                order: order.id,
            });
        }
        self.write(CF_ORDERS, order.id.as_bytes(), &order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.read(CF_ORDERS, order_id.as_bytes())
    }

    async fn load(&self, order_id: OrderId) -> Result<Option<OrderSnapshot>> {
        let _guard = self.stripe(order_id).lock().await;
        match self.read::<Order>(CF_ORDERS, order_id.as_bytes())? {
            Some(order) => Ok(Some(self.snapshot(order)?)),
            None => Ok(None),
        }
    }

    async fn commit(&self, commit: OrderCommit) -> Result<Order> {
        let order_id = commit.order.id;
        let key = order_id.as_bytes();
        let _guard = self.stripe(order_id).lock().await;
        let touches_ledger = commit.credit.is_some() || commit.review.is_some();
        let _ledger = if touches_ledger {
            Some(self.seller_stripe(commit.order.seller).lock().await)
        } else {
            None
        };

        let stored: Order = self
            .read(CF_ORDERS, key)?
            .ok_or_else(|| MarketError::not_found("order", order_id))?;
        if stored.version != commit.expected_version {
            return Err(MarketError::Conflict(order_id));
        }

        let mut batch = WriteBatch::default();

        if let Some(delivery) = &commit.delivery {
            let delivery_key = delivery_key(order_id, delivery.version);
            if self.exists(CF_DELIVERIES, &delivery_key)? {
                return Err(MarketError::Duplicate {
                    entity: "delivery",
                    order: order_id,
                });
            }
            batch.put_cf(
                self.cf(CF_DELIVERIES)?,
                delivery_key,
                serde_json::to_vec(delivery)?,
            );
        }

        if let Some(write) = &commit.dispute {
            let existing: Option<Dispute> = self.read(CF_DISPUTES, key)?;
            let dispute = match (write, existing) {
                (DisputeWrite::Open(_), Some(_)) => {
                    return Err(MarketError::Duplicate {
                        entity: "dispute",
                        order: order_id,
                    });
                }
                (DisputeWrite::Resolve(_), None) => {
                    return Err(MarketError::not_found("dispute", order_id));
                }
                (DisputeWrite::Resolve(_), Some(stored)) if stored.is_resolved => {
                    return Err(MarketError::Duplicate {
                        entity: "dispute resolution",
                        order: order_id,
                    });
                }
                (DisputeWrite::Open(dispute), None) | (DisputeWrite::Resolve(dispute), _) => {
                    dispute
                }
            };
            batch.put_cf(self.cf(CF_DISPUTES)?, key, serde_json::to_vec(dispute)?);
        }

        if let Some(review) = &commit.review {
            if self.exists(CF_REVIEWS, key)? {
                return Err(MarketError::Duplicate {
                    entity: "review",
                    order: order_id,
                });
            }
            batch.put_cf(self.cf(CF_REVIEWS)?, key, serde_json::to_vec(review)?);
        }

        let mut order = commit.order.clone();
        order.version = commit.expected_version + 1;
        batch.put_cf(self.cf(CF_ORDERS)?, key, serde_json::to_vec(&order)?);

        if touches_ledger {
            self.stage_ledger(&commit, &mut batch)?;
        }
        self.db.write(batch)?;

        Ok(order)
    }

    async fn query(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .scan_all::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|order| filter.matches(order))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn deliveries(&self, order_id: OrderId) -> Result<Vec<Delivery>> {
        let mut deliveries: Vec<Delivery> =
            self.scan_prefix(CF_DELIVERIES, order_id.as_bytes())?;
        deliveries.reverse();
        Ok(deliveries)
    }

    async fn dispute(&self, order_id: OrderId) -> Result<Option<Dispute>> {
        self.read(CF_DISPUTES, order_id.as_bytes())
    }

    async fn review(&self, order_id: OrderId) -> Result<Option<Review>> {
        self.read(CF_REVIEWS, order_id.as_bytes())
    }

    async fn append_message(&self, message: Message) -> Result<()> {
        if !self.exists(CF_ORDERS, message.order.as_bytes())? {
            return Err(MarketError::not_found("order", message.order));
        }
        let mut key = message.order.as_bytes().to_vec();
        key.extend_from_slice(message.id.as_bytes());
        self.write(CF_MESSAGES, &key, &message)
    }

    async fn messages(&self, order_id: OrderId) -> Result<Vec<Message>> {
        self.scan_prefix(CF_MESSAGES, order_id.as_bytes())
    }

    async fn seller_profile(&self, seller: UserId) -> Result<Option<SellerProfile>> {
        self.read(CF_SELLERS, &seller.0.to_be_bytes())
    }

    async fn seller_profiles(&self) -> Result<Vec<SellerProfile>> {
        self.scan_all(CF_SELLERS)
    }
}

#[async_trait]
impl NotificationSink for RocksDBStore {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let mut key = notification.recipient.0.to_be_bytes().to_vec();
        key.extend_from_slice(notification.id.as_bytes());
        self.write(CF_NOTIFICATIONS, &key, &notification)
    }

    async fn inbox(&self, user: UserId) -> Result<Vec<Notification>> {
        let mut inbox: Vec<Notification> =
            self.scan_prefix(CF_NOTIFICATIONS, &user.0.to_be_bytes())?;
        inbox.reverse();
        Ok(inbox)
    }

    async fn mark_all_read(&self, user: UserId) -> Result<usize> {
        let _guard = self.inbox.lock().await;
        let cf = self.cf(CF_NOTIFICATIONS)?;
        let mut batch = WriteBatch::default();
        let mut changed = 0;
        let stored: Vec<Notification> =
            self.scan_prefix(CF_NOTIFICATIONS, &user.0.to_be_bytes())?;
        for mut notification in stored {
            if notification.is_read {
                continue;
            }
            notification.is_read = true;
            let mut key = user.0.to_be_bytes().to_vec();
            key.extend_from_slice(notification.id.as_bytes());
            batch.put_cf(cf, key, serde_json::to_vec(&notification)?);
            changed += 1;
        }
        self.db.write(batch)?;
        Ok(changed)
    }
}
