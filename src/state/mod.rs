pub mod dedup;
pub mod rate_limit;
pub mod subscribers;
