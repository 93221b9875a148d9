pub mod error;
pub mod line_item;
pub mod match_key;
pub mod money;
pub mod period;
pub mod reference;

pub use error::ParseError;
pub use line_item::{parse_timestamp, Amount, Category, LineAmounts, LineItem};
pub use match_key::{normalize_id_suffix, MatchKey};
pub use money::Money;
pub use period::{AccountingPeriod, DateRange};
pub use reference::ReferenceRecord;
