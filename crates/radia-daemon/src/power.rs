use radia_core::app::{PowerControl, PowerError};
use std::process::Command;
use tracing::info;

/// Powers the host off by running an external command, `sudo shutdown -h now`
/// by default.
pub struct ShutdownCommand {
    argv: Vec<String>,
}

impl ShutdownCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl PowerControl for ShutdownCommand {
    fn power_off(&mut self) -> Result<(), PowerError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| PowerError("no shutdown command configured".to_string()))?;
        info!("Running {:?}", self.argv);
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| PowerError(format!("{}: {}", program, e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(PowerError(format!("{} exited with {}", program, status)))
        }
    }
}
