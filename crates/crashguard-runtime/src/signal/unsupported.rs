//! Platforms without a fault interception backend

use crashguard_core::engine::Disposition;
use crashguard_core::error::{CrashError, CrashResult};
use crashguard_core::fault::FaultContext;

pub type Dispatch = fn(&FaultContext) -> Disposition;

pub fn install(_dispatch: Dispatch) -> CrashResult<bool> {
    Err(CrashError::Unsupported)
}

pub fn uninstall() -> CrashResult<()> {
    Err(CrashError::NotInstalled)
}

pub fn is_installed() -> bool {
    false
}
