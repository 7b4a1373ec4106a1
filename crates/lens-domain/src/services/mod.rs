pub mod audit;
pub mod contracts;
pub mod listing;
pub mod micro_highs;
pub mod reaction;
pub mod series;
