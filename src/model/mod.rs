//! Types that represent the core data model, such as `Transaction` and `CategoryMap`.
mod amount;
mod category;
mod mapping;
mod range;
mod transaction;

pub use amount::{Amount, AmountError, DEFAULT_CURRENCY_SYMBOLS};
pub use category::{default_rules, CategoryKind, CategoryMap, CategoryRule, UNCATEGORIZED};
pub(crate) use category::fold;
pub use mapping::{Column, ColumnLayout};
pub use range::A1Range;
pub use transaction::{RowError, Transaction};
