use crate::domain::order::{Order, OrderStatus};
use crate::domain::review::SellerProfile;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize, PartialEq)]
pub struct OrderRow {
    pub order: String,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub escrow: Decimal,
    pub released: bool,
    pub overdue: bool,
    pub penalty: Decimal,
    pub revisions: u32,
}

impl OrderRow {
    /// Builds a row for `order`, reported under the caller's `label`.
    pub fn new(label: impl Into<String>, order: &Order) -> Self {
        Self {
            order: label.into(),
            status: order.status,
            amount: order.amount.value().normalize(),
            escrow: order.escrow_amount.0.normalize(),
            released: order.is_released,
            overdue: order.is_overdue,
            penalty: order.penalty_amount.0.normalize(),
            revisions: order.revision_count,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SellerRow {
    pub seller: u64,
    pub earnings: Decimal,
    pub rating: Decimal,
    pub reviews: u32,
}

impl From<&SellerProfile> for SellerRow {
    fn from(profile: &SellerProfile) -> Self {
        Self {
            seller: profile.seller.0,
            earnings: profile.total_earnings.0.normalize(),
            rating: profile.rating.normalize(),
            reviews: profile.review_count,
        }
    }
}

const ORDER_HEADER: [&str; 8] = [
    "order",
    "status",
    "amount",
    "escrow",
    "released",
    "overdue",
    "penalty",
    "revisions",
];
const SELLER_HEADER: [&str; 4] = ["seller", "earnings", "rating", "reviews"];

/// Writes end-of-run reports as CSV.
///
/// The header is always written, so an empty report is still a valid CSV document.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write_orders(&mut self, rows: impl IntoIterator<Item = OrderRow>) -> Result<()> {
        self.write_report(&ORDER_HEADER, rows)
    }

    pub fn write_sellers(&mut self, rows: impl IntoIterator<Item = SellerRow>) -> Result<()> {
        self.write_report(&SELLER_HEADER, rows)
    }

    fn write_report<T: Serialize>(
        &mut self,
        header: &[&str],
        rows: impl IntoIterator<Item = T>,
    ) -> Result<()> {
        self.writer.write_record(header)?;
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::domain::order::UserId;
    use rust_decimal_macros::dec;

    #[test]
    fn test_seller_report_normalizes_decimals() {
        let mut profile = SellerProfile::new(UserId(2));
        profile.credit(Balance::new(dec!(50.00)));
        profile.rating = dec!(4.50);
        profile.review_count = 2;

        let mut buffer = Vec::new();
        {
            let mut writer = ReportWriter::new(&mut buffer);
            writer
                .write_sellers([SellerRow::from(&profile)])
                .unwrap();
        }
        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(output, "seller,earnings,rating,reviews\n2,50,4.5,2\n");
    }

    #[test]
    fn test_empty_report_keeps_header() {
        let mut buffer = Vec::new();
        {
            let mut writer = ReportWriter::new(&mut buffer);
            writer.write_orders(Vec::new()).unwrap();
        }
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "order,status,amount,escrow,released,overdue,penalty,revisions\n"
        );
    }
}
