//! Client for the UMO IQ (formerly NextBus) public JSON transit feed.
//!
//! [`FeedHandler`] fetches agencies, routes, stops and arrival predictions
//! and keeps them in a time-bounded cache:
//!
//! ```no_run
//! use umo_feed::{CacheOptions, FeedHandler};
//!
//! # fn main() -> umo_feed::Result<()> {
//! let mut feed = FeedHandler::new()?;
//! for prediction in feed.get_predictions("sf-muni", "15205", CacheOptions::default())? {
//!     println!("{} in {} min", prediction.route, prediction.minutes);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod coerce;
pub mod command;
pub mod config;
pub mod decode;
pub mod error;
pub mod handler;
pub mod identifiers;
pub mod logger;
pub mod models;
pub mod normalize;
pub mod transport;

pub use command::{Command, FEED_URI};
pub use config::{CacheOptions, FetchConfig, HandlerConfig, HandlerConfigBuilder};
pub use error::{DecodeError, FeedError, Result, TransportError};
pub use handler::FeedHandler;
pub use identifiers::{AgencyTag, RouteTag, ServiceTag, StopId, StopTag};
pub use models::{Agency, Prediction, Route, Service, Stop};
pub use normalize::{Record, sequence};
pub use transport::{CancelHandle, Fetcher, HttpFetcher, Transport};
