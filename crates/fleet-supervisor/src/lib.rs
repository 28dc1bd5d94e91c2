pub mod applier;
pub mod backend;
pub mod error;
pub mod machine;
pub mod metrics;
pub mod placement;
pub mod provisioner;
pub mod store;
pub mod supervisor;

pub use error::SupervisorError;
pub use provisioner::{InstallationProvisioner, ProvisionerError};
pub use store::InstallationStore;
pub use supervisor::InstallationSupervisor;
