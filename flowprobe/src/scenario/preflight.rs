//! Environment egress sanity check.

use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// Verify the environment can reach the external internet.
///
/// This is not a test of the system under test: a cluster with no egress
/// fails every connectivity scenario in confusing ways, so the check runs
/// once up front and is fatal. The request carries a hard client timeout;
/// anything but a 200 response is a failure.
pub async fn check_external_egress(url: &str, timeout: Duration) -> HarnessResult<()> {
    let unavailable = |reason: String| HarnessError::EgressUnavailable {
        url: url.to_string(),
        reason,
    };
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| unavailable(err.to_string()))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| unavailable(err.to_string()))?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(unavailable(format!(
            "unexpected status {}, expected 200",
            response.status()
        )));
    }
    tracing::debug!("egress preflight against {url} succeeded");
    Ok(())
}
