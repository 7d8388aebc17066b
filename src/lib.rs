pub mod common;
pub mod data;
pub mod delta;
pub mod filter;
pub mod html;
pub mod identity;
pub mod merge;
pub mod net;
pub mod pipeline;
pub mod scraper;
pub mod sort;
