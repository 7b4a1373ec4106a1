pub mod cache;
pub mod dataset;
pub mod fetcher;
pub mod klines;
