pub mod loader;
pub mod types;

pub use loader::{dataframe_to_series, DataLoader, InMemoryProvider, LoaderError, PriceProvider, EXPECTED_COLUMNS};
pub use types::{PriceBar, PriceSeries, SeriesError};
