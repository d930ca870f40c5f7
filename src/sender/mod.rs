//! Transport seam: the HTTP surface the queue consumes.
//!
//! The uploader only ever needs two calls — fetch a server-issued document
//! id and PUT a document body — so that is the whole `ApiClient` trait.
//! `HttpApiClient` is the reqwest-backed production implementation.

pub mod client;

pub use client::{ApiClient, ClientConfig, ClientError, HttpApiClient, RequestStats};
