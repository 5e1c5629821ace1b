mod error;
mod normalize;
mod store;

pub use error::FrontierError;
pub use normalize::{is_fetchable, normalize};
pub use store::{FrontierStats, FrontierStore, SelectionMode, UrlRecord, UrlStatus};
