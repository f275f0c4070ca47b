pub mod channels;
pub mod cli;
pub mod config;
pub mod driver;
pub mod extract;
pub mod input;
pub mod logging;
pub mod models;
pub mod network;
pub mod pacing;
pub mod report;
pub mod resolver;
pub mod search;
pub mod store;
pub mod visited;

// Re-export main types for library usage
pub use channels::{ChannelHealth, ChannelState, SearchChannel};
pub use driver::{run_batch, BatchOptions, BatchSummary};
pub use extract::Extractor;
pub use models::{LookupKind, ProductId};
pub use network::{FetchError, FetchResponse, HttpClient, PageFetcher};
pub use pacing::Pacer;
pub use resolver::{Resolution, Resolver};
pub use search::{ProductSearch, SearchError, WebSearch};
pub use store::{PersistedState, StateStore};
pub use visited::VisitedUrls;
