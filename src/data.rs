pub mod cache;
pub mod store;

pub use cache::{cache_key, LookupCache};
pub use store::{read_records, write_records};
