use fleet_meta::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The store could not list installations pending work; nothing was processed.
    #[error("failed to list installations pending work: {0}")]
    ListPendingWork(#[source] StoreError),
}
