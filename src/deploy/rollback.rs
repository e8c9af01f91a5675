// ABOUTME: Rollback plan for a failed deployment attempt.
// ABOUTME: A pure function of the recorded phase; the deployer decides whether to run it.

use super::commands;
use super::state::{DeployPhase, DeployState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackAction {
    Stop(String),
    Remove(String),
}

impl RollbackAction {
    pub fn container(&self) -> &str {
        match self {
            RollbackAction::Stop(name) | RollbackAction::Remove(name) => name,
        }
    }

    pub fn command(&self) -> String {
        match self {
            RollbackAction::Stop(name) => commands::stop_container(name),
            RollbackAction::Remove(name) => commands::remove_container(name),
        }
    }
}

pub(crate) fn stop_and_remove(container: &str) -> Vec<RollbackAction> {
    vec![
        RollbackAction::Stop(container.to_string()),
        RollbackAction::Remove(container.to_string()),
    ]
}

/// Containers to stop and remove for an attempt that failed in `state.phase()`.
///
/// Before the candidate exists nothing is undone. Until the swap only the
/// temporary container is touched, so the old release keeps serving. From
/// the swap on, the production-named container is the new release.
pub fn rollback_actions(state: &DeployState) -> Vec<RollbackAction> {
    match state.phase() {
        DeployPhase::Init | DeployPhase::PrepareRelease => Vec::new(),
        DeployPhase::StartNewContainer | DeployPhase::PreDeployHooks | DeployPhase::HealthCheck => {
            stop_and_remove(&state.temp_container_name)
        }
        DeployPhase::SwapContainers
        | DeployPhase::PostDeployHooks
        | DeployPhase::Cleanup
        | DeployPhase::Done => stop_and_remove(state.production_container()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppName;

    fn state_at(phase: DeployPhase) -> DeployState {
        let mut state = DeployState::new(&AppName::new("shop").unwrap());
        while state.phase() < phase {
            let next = state.phase().next().unwrap();
            state.advance(next).unwrap();
        }
        state
    }

    #[test]
    fn nothing_to_undo_before_container_start() {
        assert!(rollback_actions(&state_at(DeployPhase::Init)).is_empty());
        assert!(rollback_actions(&state_at(DeployPhase::PrepareRelease)).is_empty());
    }

    #[test]
    fn pre_swap_targets_temp_only() {
        for phase in [
            DeployPhase::StartNewContainer,
            DeployPhase::PreDeployHooks,
            DeployPhase::HealthCheck,
        ] {
            let actions = rollback_actions(&state_at(phase));
            assert_eq!(
                actions,
                vec![
                    RollbackAction::Stop("shop-new".to_string()),
                    RollbackAction::Remove("shop-new".to_string()),
                ],
                "phase {}",
                phase
            );
        }
    }

    #[test]
    fn post_swap_targets_production_only() {
        for phase in [
            DeployPhase::SwapContainers,
            DeployPhase::PostDeployHooks,
            DeployPhase::Cleanup,
            DeployPhase::Done,
        ] {
            let actions = rollback_actions(&state_at(phase));
            assert!(!actions.is_empty());
            assert!(actions.iter().all(|a| a.container() == "shop"), "phase {}", phase);
        }
    }

    #[test]
    fn commands_are_quoted() {
        assert_eq!(
            RollbackAction::Stop("shop-new".to_string()).command(),
            "docker stop --time 10 'shop-new'"
        );
        assert_eq!(
            RollbackAction::Remove("shop-new".to_string()).command(),
            "docker rm -f 'shop-new'"
        );
        assert_eq!(
            RollbackAction::Stop("shop".to_string()).command(),
            commands::stop_container("shop")
        );
        assert_eq!(
            RollbackAction::Remove("shop".to_string()).command(),
            commands::remove_container("shop")
        );
    }
}
