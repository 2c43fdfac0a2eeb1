use std::sync::{Mutex, MutexGuard};

use crate::models::{EngineError, EngineErrorKind};
use crate::orchestration::{ControlledOperation, OperationControl, OrchestrationResult};

/// Holds the one live poller or coordinator of a view.
#[derive(Default)]
pub struct OperationSlot {
    active: Mutex<Option<OperationControl>>,
}

impl OperationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever is live, then start and park the next operation.
    ///
    /// Both steps happen under the slot lock so two concurrent launches
    /// cannot leave two live operations behind.
    pub fn launch<H: ControlledOperation>(
        &self,
        start: impl FnOnce() -> H,
    ) -> OrchestrationResult<H> {
        let mut active = self.lock_active()?;
        if let Some(previous) = active.take()
            && previous.is_live()
        {
            tracing::info!(
                kind = previous.kind().as_str(),
                "cancelling previous operation before starting a new one"
            );
            previous.cancel();
        }

        let handle = start();
        *active = Some(handle.control());
        Ok(handle)
    }

    /// Returns true when a live operation was asked to stop.
    pub fn cancel_active(&self) -> OrchestrationResult<bool> {
        let active = self.lock_active()?;
        match active.as_ref() {
            Some(control) if control.is_live() => {
                control.cancel();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The parked operation while it is still live.
    pub fn active(&self) -> OrchestrationResult<Option<OperationControl>> {
        let active = self.lock_active()?;
        Ok(active.as_ref().filter(|control| control.is_live()).cloned())
    }

    fn lock_active(&self) -> OrchestrationResult<MutexGuard<'_, Option<OperationControl>>> {
        self.active.lock().map_err(|_| {
            EngineError::new(EngineErrorKind::Internal, "operation slot mutex poisoned")
        })
    }
}
