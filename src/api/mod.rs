pub mod client;
pub mod memory;
pub mod store;
pub mod types;
