pub mod store;

pub use store::PoolStore;
