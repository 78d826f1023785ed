//! Client-side paginated, searchable post feed with pull-to-refresh.
//!
//! The whole collection is fetched in one request by a [`fetcher::PostSource`];
//! [`feed::FeedList`] then pages through and filters the local copy.

pub mod config;
pub mod feed;
pub mod fetcher;
pub mod models;
pub mod session;
