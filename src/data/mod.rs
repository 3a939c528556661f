//! Data boundary: raw series types, the provider seam, and persistence.

pub mod fred;
pub mod provider;
pub mod store;
pub mod types;

pub use fred::{FredClient, FredError};
pub use provider::{FetchError, MemoryProvider, SeriesProvider};
pub use store::SeriesStore;
pub use types::{Frequency, ObservationSeries, RawObservation, SeriesRole};
