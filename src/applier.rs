use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{ApplyStage, DisplayError},
    mode::DisplayMode,
    platform::{ChangeFlags, ChangeTarget, DisplayChangeStatus, PlatformDisplayApi, STATUS_SUCCESS, Status},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyState {
    Idle,
    Testing,
    Applied,
    RegistryStaged,
    Committed,
    Failed,
}

impl ApplyState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplyState::Applied | ApplyState::Committed | ApplyState::Failed
        )
    }
}

/// Which path activated the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    /// The immediate apply took effect.
    Applied,
    /// The mode was staged in the registry and activated by a global commit.
    Committed,
}

/// Drives one mode change through test, immediate apply and the
/// registry-stage-and-commit fallback.
///
/// An applier runs once. After a terminal state it has to be [`reset`] before
/// it accepts another candidate.
///
/// [`reset`]: ModeApplier::reset
pub struct ModeApplier<'a, A: PlatformDisplayApi + ?Sized> {
    api: &'a A,
    state: ApplyState,
}

impl<'a, A: PlatformDisplayApi + ?Sized> ModeApplier<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            state: ApplyState::Idle,
        }
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ApplyState::Idle;
    }

    pub fn apply(
        &mut self,
        device_name: &str,
        mode: &DisplayMode,
    ) -> Result<ApplyOutcome, DisplayError> {
        if self.state != ApplyState::Idle {
            return Err(DisplayError::ApplierNotIdle { state: self.state });
        }
        let target = ChangeTarget::Device { device_name, mode };

        self.state = ApplyState::Testing;
        let status = self.change("test", target, ChangeFlags::TEST);
        if status != STATUS_SUCCESS {
            self.state = ApplyState::Failed;
            return Err(DisplayError::ModeTestFailure {
                mode: *mode,
                code: status,
            });
        }

        let status = self.change("immediate apply", target, ChangeFlags::empty());
        if status == STATUS_SUCCESS {
            self.state = ApplyState::Applied;
            info!("Applied {} to {}", mode, device_name);
            return Ok(ApplyOutcome::Applied);
        }

        // Once staged the commit always runs, otherwise the device is left
        // staged but inactive.
        self.state = ApplyState::RegistryStaged;
        let staged = self.change(
            "registry stage",
            target,
            ChangeFlags::UPDATE_REGISTRY | ChangeFlags::NO_RESET,
        );
        let committed = self.change("global commit", ChangeTarget::Global, ChangeFlags::empty());

        let failure = if staged != STATUS_SUCCESS {
            Some((ApplyStage::RegistryStage, staged))
        } else if committed != STATUS_SUCCESS {
            Some((ApplyStage::Commit, committed))
        } else {
            None
        };
        match failure {
            Some((stage, code)) => {
                self.state = ApplyState::Failed;
                warn!("Applying {} to {} failed during {}", mode, device_name, stage);
                Err(DisplayError::ModeApplyFailure { stage, code })
            }
            None => {
                self.state = ApplyState::Committed;
                info!("Committed {} to {}", mode, device_name);
                Ok(ApplyOutcome::Committed)
            }
        }
    }

    fn change(&self, stage: &str, target: ChangeTarget<'_>, flags: ChangeFlags) -> Status {
        let status = self.api.change_mode(target, flags);
        debug!(
            "Mode change {} ({:?}) returned {:?} ({})",
            stage,
            flags,
            DisplayChangeStatus::from(status),
            status
        );
        status
    }
}
