pub mod cache;
pub mod exchanges;
pub mod http;
pub mod reporting;
