//! Installation state machine.
//!
//! [`evaluate`] maps an installation's stored state and the states of its
//! cluster installations to the installation's next state and the work to do
//! on its children. It is pure: the supervisor does the I/O.

use std::collections::BTreeSet;

use fleet_common::{ClusterInstallationState as Child, InstallationState};

/// Work to perform on every child currently in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAction {
    /// Provisioner create. The child becomes stable, or creation-failed.
    Provision,
    /// Provisioner delete to start teardown. The child becomes
    /// deletion-requested, or deletion-failed.
    RequestDeletion,
    /// Provisioner delete to finish teardown. The child becomes deleted, or
    /// deletion-failed.
    ConfirmDeletion,
}

impl ChildAction {
    pub fn on_success(self) -> Child {
        match self {
            ChildAction::Provision => Child::Stable,
            ChildAction::RequestDeletion => Child::DeletionRequested,
            ChildAction::ConfirmDeletion => Child::Deleted,
        }
    }

    pub fn on_failure(self) -> Child {
        match self {
            ChildAction::Provision => Child::CreationFailed,
            ChildAction::RequestDeletion | ChildAction::ConfirmDeletion => Child::DeletionFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildStep {
    pub from: Child,
    pub action: ChildAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Work was decided: a state change, child steps, or a cluster assignment.
    Progress,
    /// Nothing to do.
    Settled,
    /// The stored state, or its combination with the children, is not one the
    /// machine knows how to move. Nothing is done; the caller reports it.
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub next: InstallationState,
    pub assign_cluster: bool,
    pub steps: Vec<ChildStep>,
    pub verdict: Verdict,
}

impl Evaluation {
    fn settled(state: &InstallationState) -> Self {
        Self {
            next: state.clone(),
            assign_cluster: false,
            steps: Vec::new(),
            verdict: Verdict::Settled,
        }
    }

    fn unexpected(state: &InstallationState) -> Self {
        Self {
            verdict: Verdict::Unexpected,
            ..Self::settled(state)
        }
    }

    fn to(next: InstallationState) -> Self {
        Self {
            next,
            assign_cluster: false,
            steps: Vec::new(),
            verdict: Verdict::Progress,
        }
    }

    fn stay(state: &InstallationState, steps: Vec<ChildStep>) -> Self {
        let verdict = if steps.is_empty() {
            Verdict::Settled
        } else {
            Verdict::Progress
        };
        Self {
            next: state.clone(),
            assign_cluster: false,
            steps,
            verdict,
        }
    }

    /// The action decided for children in `state`, if any.
    pub fn action_for(&self, state: Child) -> Option<ChildAction> {
        self.steps
            .iter()
            .find(|step| step.from == state)
            .map(|step| step.action)
    }

    pub fn changes_state(&self, current: &InstallationState) -> bool {
        &self.next != current
    }
}

/// Decide what happens next for an installation in `state` whose cluster
/// installations are in `children`.
pub fn evaluate(state: &InstallationState, children: &[Child]) -> Evaluation {
    let observed: BTreeSet<Child> = children.iter().copied().collect();

    match state {
        InstallationState::CreationRequested | InstallationState::CreationInProgress => {
            evaluate_creation(state, &observed)
        }
        InstallationState::DeletionRequested => evaluate_deletion_request(&observed),
        InstallationState::DeletionInProgress => evaluate_deletion_progress(state, &observed),
        InstallationState::Stable => evaluate_stable(state, &observed),
        InstallationState::CreationFailed
        | InstallationState::DeletionFailed
        | InstallationState::Deleted => Evaluation::settled(state),
        InstallationState::Unknown(_) => Evaluation::unexpected(state),
    }
}

fn evaluate_creation(state: &InstallationState, observed: &BTreeSet<Child>) -> Evaluation {
    // Deleted rows are history from an earlier placement.
    let live: BTreeSet<Child> = observed.iter().copied().filter(|c| c.is_live()).collect();

    if live.is_empty() {
        return Evaluation {
            assign_cluster: true,
            verdict: Verdict::Progress,
            ..Evaluation::settled(state)
        };
    }
    if live.iter().any(|c| c.is_failed()) {
        return Evaluation::to(InstallationState::CreationFailed);
    }
    if live.iter().all(|&c| c == Child::Stable) {
        return Evaluation::to(InstallationState::Stable);
    }
    if live.iter().any(|c| c.is_deleting()) {
        return Evaluation::unexpected(state);
    }

    let steps = live
        .iter()
        .filter(|&&c| matches!(c, Child::CreationRequested | Child::CreationInProgress))
        .map(|&from| ChildStep {
            from,
            action: ChildAction::Provision,
        })
        .collect();
    Evaluation::stay(state, steps)
}

fn evaluate_deletion_request(observed: &BTreeSet<Child>) -> Evaluation {
    let steps: Vec<ChildStep> = observed
        .iter()
        .filter(|c| c.is_live())
        .map(|&from| ChildStep {
            from,
            action: ChildAction::RequestDeletion,
        })
        .collect();

    if steps.is_empty() {
        return Evaluation::to(InstallationState::Deleted);
    }
    Evaluation {
        steps,
        ..Evaluation::to(InstallationState::DeletionInProgress)
    }
}

fn evaluate_deletion_progress(state: &InstallationState, observed: &BTreeSet<Child>) -> Evaluation {
    if observed.iter().any(|c| c.is_failed()) {
        return Evaluation::to(InstallationState::DeletionFailed);
    }
    if observed.iter().all(|&c| c == Child::Deleted) {
        return Evaluation::to(InstallationState::Deleted);
    }

    let steps = observed
        .iter()
        .filter(|c| c.is_live())
        .map(|&from| ChildStep {
            from,
            action: if from.is_deleting() {
                ChildAction::ConfirmDeletion
            } else {
                ChildAction::RequestDeletion
            },
        })
        .collect();
    Evaluation::stay(state, steps)
}

fn evaluate_stable(state: &InstallationState, observed: &BTreeSet<Child>) -> Evaluation {
    let mut live = observed.iter().filter(|c| c.is_live()).peekable();
    if live.peek().is_some() && live.all(|&c| c == Child::Stable) {
        return Evaluation::settled(state);
    }
    Evaluation::unexpected(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_common::ClusterInstallationState::*;

    const ALL_CHILD_STATES: [Child; 8] = [
        CreationRequested,
        CreationInProgress,
        CreationFailed,
        Stable,
        DeletionRequested,
        DeletionInProgress,
        DeletionFailed,
        Deleted,
    ];

    #[test]
    fn test_creation_without_children_assigns_a_cluster() {
        let eval = evaluate(&InstallationState::CreationRequested, &[]);
        assert!(eval.assign_cluster);
        assert_eq!(eval.next, InstallationState::CreationRequested);
        assert!(eval.steps.is_empty());
        assert_eq!(eval.verdict, Verdict::Progress);
    }

    #[test]
    fn test_creation_with_only_deleted_children_reassigns() {
        let eval = evaluate(&InstallationState::CreationRequested, &[Deleted]);
        assert!(eval.assign_cluster);
    }

    #[test]
    fn test_creation_requested_child_is_provisioned() {
        let eval = evaluate(&InstallationState::CreationRequested, &[CreationRequested]);
        assert!(!eval.assign_cluster);
        assert_eq!(eval.next, InstallationState::CreationRequested);
        assert_eq!(eval.action_for(CreationRequested), Some(ChildAction::Provision));
    }

    #[test]
    fn test_creation_converges_only_when_every_child_is_stable() {
        let eval = evaluate(&InstallationState::CreationRequested, &[Stable, Stable]);
        assert_eq!(eval.next, InstallationState::Stable);

        let eval = evaluate(&InstallationState::CreationRequested, &[Stable, CreationRequested]);
        assert_eq!(eval.next, InstallationState::CreationRequested);
        assert_eq!(eval.action_for(CreationRequested), Some(ChildAction::Provision));
        assert_eq!(eval.action_for(Stable), None);
    }

    #[test]
    fn test_failure_dominates_in_every_phase() {
        for extra in ALL_CHILD_STATES {
            for failed in [CreationFailed, DeletionFailed] {
                let children = [Stable, extra, failed, Stable];

                let eval = evaluate(&InstallationState::CreationRequested, &children);
                assert_eq!(eval.next, InstallationState::CreationFailed, "{children:?}");
                assert!(eval.steps.is_empty());

                let eval = evaluate(&InstallationState::DeletionInProgress, &children);
                assert_eq!(eval.next, InstallationState::DeletionFailed, "{children:?}");
                assert!(eval.steps.is_empty());
            }
        }
    }

    #[test]
    fn test_deletion_request_tears_down_live_children() {
        let eval = evaluate(&InstallationState::DeletionRequested, &[Stable]);
        assert_eq!(eval.next, InstallationState::DeletionInProgress);
        assert_eq!(eval.action_for(Stable), Some(ChildAction::RequestDeletion));
        assert_eq!(ChildAction::RequestDeletion.on_success(), DeletionRequested);

        let eval = evaluate(&InstallationState::DeletionRequested, &[CreationRequested, Deleted]);
        assert_eq!(eval.action_for(CreationRequested), Some(ChildAction::RequestDeletion));
        assert_eq!(eval.action_for(Deleted), None);
    }

    #[test]
    fn test_deletion_request_retries_failed_children() {
        let eval = evaluate(&InstallationState::DeletionRequested, &[DeletionFailed]);
        assert_eq!(eval.next, InstallationState::DeletionInProgress);
        assert_eq!(eval.action_for(DeletionFailed), Some(ChildAction::RequestDeletion));
    }

    #[test]
    fn test_deletion_request_with_nothing_live_is_deleted() {
        assert_eq!(
            evaluate(&InstallationState::DeletionRequested, &[]).next,
            InstallationState::Deleted
        );
        assert_eq!(
            evaluate(&InstallationState::DeletionRequested, &[Deleted]).next,
            InstallationState::Deleted
        );
    }

    #[test]
    fn test_deletion_progress() {
        let eval = evaluate(&InstallationState::DeletionInProgress, &[Deleted]);
        assert_eq!(eval.next, InstallationState::Deleted);

        let eval = evaluate(&InstallationState::DeletionInProgress, &[Deleted, DeletionRequested]);
        assert_eq!(eval.next, InstallationState::DeletionInProgress);
        assert_eq!(eval.action_for(DeletionRequested), Some(ChildAction::ConfirmDeletion));
        assert_eq!(ChildAction::ConfirmDeletion.on_success(), Deleted);

        let eval = evaluate(&InstallationState::DeletionInProgress, &[Stable]);
        assert_eq!(eval.action_for(Stable), Some(ChildAction::RequestDeletion));
    }

    #[test]
    fn test_deleted_iff_every_child_deleted() {
        for a in ALL_CHILD_STATES {
            for b in ALL_CHILD_STATES {
                let eval = evaluate(&InstallationState::DeletionInProgress, &[a, b]);
                let all_deleted = a == Deleted && b == Deleted;
                assert_eq!(eval.next == InstallationState::Deleted, all_deleted, "{a:?} {b:?}");

                let eval = evaluate(&InstallationState::CreationRequested, &[a, b]);
                let all_stable = [a, b].iter().filter(|c| c.is_live()).all(|&c| c == Stable)
                    && (a.is_live() || b.is_live());
                assert_eq!(eval.next == InstallationState::Stable, all_stable, "{a:?} {b:?}");
            }
        }
    }

    #[test]
    fn test_stable_with_stable_children_is_a_no_op() {
        let eval = evaluate(&InstallationState::Stable, &[Stable]);
        assert_eq!(eval.verdict, Verdict::Settled);
        assert!(!eval.changes_state(&InstallationState::Stable));
        assert!(eval.steps.is_empty());
    }

    #[test]
    fn test_stable_divergence_is_unexpected() {
        let cases: [&[Child]; 3] = [&[], &[CreationFailed], &[Stable, DeletionRequested]];
        for children in cases {
            let eval = evaluate(&InstallationState::Stable, children);
            assert_eq!(eval.verdict, Verdict::Unexpected);
            assert_eq!(eval.next, InstallationState::Stable);
            assert!(eval.steps.is_empty());
        }
    }

    #[test]
    fn test_unknown_state_is_reported_not_moved() {
        let state = InstallationState::Unknown("hibernating".to_string());
        let eval = evaluate(&state, &[Stable]);
        assert_eq!(eval.verdict, Verdict::Unexpected);
        assert_eq!(eval.next, state);
    }

    #[test]
    fn test_creation_with_deleting_children_is_unexpected() {
        let eval = evaluate(&InstallationState::CreationInProgress, &[DeletionRequested]);
        assert_eq!(eval.verdict, Verdict::Unexpected);
        assert_eq!(eval.next, InstallationState::CreationInProgress);
    }

    #[test]
    fn test_terminal_states_are_settled() {
        for state in [
            InstallationState::CreationFailed,
            InstallationState::DeletionFailed,
            InstallationState::Deleted,
        ] {
            let eval = evaluate(&state, &[Stable]);
            assert_eq!(eval.verdict, Verdict::Settled);
            assert_eq!(eval.next, state);
        }
    }
}
