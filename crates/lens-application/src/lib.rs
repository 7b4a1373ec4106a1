pub mod config;
pub mod pipeline;
pub mod series;
pub mod validation;
