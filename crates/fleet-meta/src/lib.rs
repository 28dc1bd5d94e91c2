pub mod error;
pub mod etcd;
pub mod memory;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use etcd::EtcdMetaStore;
pub use memory::MemoryMetaStore;
pub use store::{FleetStore, LockRecord, LockToken, StoreResult};
pub use types::MetaStore;
