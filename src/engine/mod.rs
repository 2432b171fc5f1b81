pub mod assignment;
pub mod performance;
pub mod scoring;
pub mod surge;
pub mod timeout;
