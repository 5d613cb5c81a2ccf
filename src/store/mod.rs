pub mod error;
pub mod object_store;

pub use error::{StoreError, StoreResult};
pub use object_store::ObjectStore;
