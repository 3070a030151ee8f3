//! Flow-table verification helpers.

use crate::error::{HarnessError, HarnessResult};

/// Verify a flow-table dump shows zero packets toward `target`.
///
/// Lines not mentioning the target are irrelevant and skipped. Any
/// matching flow whose packet counter moved off zero fails with the
/// offending line, naming the path that should have stayed cold.
pub fn assert_path_cold(dump: &str, target: &str) -> HarnessResult<()> {
    for flow in dump.lines() {
        if !flow.contains(target) {
            continue;
        }
        if !flow.contains("n_packets=0") {
            return Err(HarnessError::UnexpectedTraffic {
                target: target.to_string(),
                flow: flow.trim().to_string(),
            });
        }
    }
    Ok(())
}
