pub mod canonical;
pub mod records;
pub mod snapshot;
pub mod token;

pub use canonical::{classify_price_entry, identify_model, CanonicalModel, Direction};
pub use records::{DailyCost, ExchangeRates, Fetched, PriceRecord, SourceStatus, UsageRecord};
pub use snapshot::{DashboardSnapshot, ModelSnapshot, SourceHealth, SparkPoint, Summary};
pub use token::CachedToken;
