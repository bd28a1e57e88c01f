pub mod environment;
pub mod error;
pub mod local;
pub mod memory;
pub mod store;

pub use environment::{Environment, SharedEnvironment};
pub use error::StoreError;
pub use local::LocalFileStore;
pub use memory::InMemoryEnvironmentStore;
pub use store::EnvironmentStore;
