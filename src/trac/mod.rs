pub mod store;

pub use store::TracStore;
