mod dom;
mod fetcher;
mod sink;

pub use dom::{DomLinkExtractor, DomTextExtractor};
pub use fetcher::HttpFetcher;
pub use sink::FileSink;
