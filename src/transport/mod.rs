pub mod adapters;
pub mod connection;
pub mod traits;
