use crate::error::{MarketError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Gig,
    Order,
    Pay,
    Start,
    Deliver,
    Revise,
    Complete,
    Dispute,
    Refund,
    Release,
    Extend,
    Cancel,
    Review,
    Message,
    Sweep,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Gig => "gig",
            Action::Order => "order",
            Action::Pay => "pay",
            Action::Start => "start",
            Action::Deliver => "deliver",
            Action::Revise => "revise",
            Action::Complete => "complete",
            Action::Dispute => "dispute",
            Action::Refund => "refund",
            Action::Release => "release",
            Action::Extend => "extend",
            Action::Cancel => "cancel",
            Action::Review => "review",
            Action::Message => "message",
            Action::Sweep => "sweep",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a command script. Which optional columns matter depends on the action.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRecord {
    pub action: Action,
    pub user: u64,
    /// Caller-chosen label standing in for the generated order id.
    pub order: Option<String>,
    pub gig: Option<u64>,
    pub amount: Option<Decimal>,
    pub text: Option<String>,
    pub date: Option<NaiveDate>,
    pub rating: Option<u8>,
}

/// Reads marketplace commands from a CSV source.
///
/// Whitespace is trimmed and trailing optional columns may be left off.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes commands, one `Result` per row.
    pub fn commands(self) -> impl Iterator<Item = Result<CommandRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(MarketError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "action, user, order, gig, amount, text, date, rating\n\
                    gig, 2, , 7, 50.00, Logo design, ,\n\
                    order, 1, o1, 7, , , 2026-03-01,\n\
                    review, 1, o1, , , Great, , 5";
        let reader = CommandReader::new(data.as_bytes());
        let results: Vec<Result<CommandRecord>> = reader.commands().collect();

        assert_eq!(results.len(), 3);
        let gig = results[0].as_ref().unwrap();
        assert_eq!(gig.action, Action::Gig);
        assert_eq!(gig.amount, Some(dec!(50.00)));
        assert_eq!(gig.text.as_deref(), Some("Logo design"));
        assert_eq!(gig.order, None);

        let order = results[1].as_ref().unwrap();
        assert_eq!(order.order.as_deref(), Some("o1"));
        assert_eq!(order.date, NaiveDate::from_ymd_opt(2026, 3, 1));

        let review = results[2].as_ref().unwrap();
        assert_eq!(review.rating, Some(5));
    }

    #[test]
    fn test_reader_short_rows() {
        let data = "action,user,order,gig,amount,text,date,rating\nstart,2,o1";
        let reader = CommandReader::new(data.as_bytes());
        let record = reader.commands().next().unwrap().unwrap();
        assert_eq!(record.action, Action::Start);
        assert_eq!(record.text, None);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "action,user,order,gig,amount,text,date,rating\nrefund-all,1,o1,,,,,";
        let reader = CommandReader::new(data.as_bytes());
        let results: Vec<Result<CommandRecord>> = reader.commands().collect();

        assert!(results[0].is_err());
    }
}
