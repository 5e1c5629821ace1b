mod collab;
mod config;
mod dispatcher;
mod pool;

pub use collab::{
    FetchError, FetchedPage, Fetcher, LinkExtractor, PageMeta, PageOutcome, PageSink,
    RenderFetcher, TextExtractor,
};
pub use config::CrawlerConfig;
pub use dispatcher::{run_crawl, Collaborators, CrawlReport};
pub use pool::{DriverPool, PoolError};

pub use anyhow;
