pub mod config;
pub mod error;
pub mod facets;
pub mod normalize;
pub mod pace;
pub mod table;
pub mod testutil;
pub mod traits;

pub use config::ClientConfig;
pub use error::AppError;
pub use facets::Attribute;
pub use normalize::{MultiValuePolicy, NormalizedRecord, Normalizer};
pub use table::{ColumnType, Table};
pub use traits::Fetcher;
