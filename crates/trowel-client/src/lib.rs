pub mod cache;
pub mod client;
pub mod fetcher;

pub use cache::ResponseCache;
pub use client::OpenContextClient;
pub use fetcher::ReqwestFetcher;
