//! Organization search API: client, query body, location parsing and the
//! cursor-paginated fetch loop.
pub mod client;
pub mod fetch;
pub mod location;
pub mod query;

pub use client::{CrunchbaseClient, SearchError};
pub use query::SearchQuery;
