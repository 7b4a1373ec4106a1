pub mod announcement;
pub mod candle;
pub mod contract;
pub mod duration;
pub mod fingerprint;
pub mod reaction;
