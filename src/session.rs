//! Session: one authenticated connection plus its tuning options

use crate::api::ApiClient;
use crate::http::{HttpClient, HttpClientConfig};

/// Which pagination protocol the server speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationProtocol {
    /// Opaque cursor returned with each page; empty/absent cursor terminates
    #[default]
    ContinuationToken,
    /// Range re-issue: advance the request start past the last key seen
    Offset,
}

/// Tuning options, evaluated once per pull/push call
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Samples/capsules requested per page on pull
    pub pull_page_size: usize,
    /// Samples/capsules flushed per write on push
    pub push_page_size: usize,
    /// Upper bound on in-flight row jobs
    pub max_concurrent_requests: usize,
    /// Pagination protocol for this server
    pub pagination: PaginationProtocol,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            pull_page_size: 1_000_000,
            push_page_size: 100_000,
            max_concurrent_requests: 8,
            pagination: PaginationProtocol::ContinuationToken,
        }
    }
}

/// A connection to one analytics server
#[derive(Debug)]
pub struct Session {
    client: ApiClient,
    options: SessionOptions,
}

impl Session {
    /// Connect with default options
    pub fn new(http_config: HttpClientConfig) -> Self {
        Self::with_options(http_config, SessionOptions::default())
    }

    /// Connect with explicit options
    pub fn with_options(http_config: HttpClientConfig, options: SessionOptions) -> Self {
        Self {
            client: ApiClient::new(HttpClient::with_config(http_config)),
            options,
        }
    }

    /// Wrap an existing API client
    pub fn from_client(client: ApiClient, options: SessionOptions) -> Self {
        Self { client, options }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}
