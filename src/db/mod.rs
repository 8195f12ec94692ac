mod reading;
mod repository;
mod schema;

pub use repository::{Repository, StoreStats};
