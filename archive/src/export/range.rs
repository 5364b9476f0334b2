//! Right bound resolution for historical exports

use tracing::debug;

use crate::{
    client::Client,
    error::{ArchiveError, Result},
};

/// Clamp a requested upper bound to what the chain has produced.
///
/// A missing bound, or one at or past the latest height, resolves to the
/// latest height.
pub fn resolve_right_bound(requested_to: Option<u64>, latest: u64) -> u64 {
    match requested_to {
        Some(to) if to < latest => to,
        _ => latest,
    }
}

/// Query the node for its latest height and resolve the right bound against it
pub async fn determine_right_bound<C>(client: &C, requested_to: Option<u64>) -> Result<u64>
where
    C: Client + ?Sized,
{
    let latest = client
        .get_latest_block_number()
        .await
        .map_err(ArchiveError::Resolve)?;

    let to = resolve_right_bound(requested_to, latest);
    debug!(?requested_to, latest, to, "Resolved right bound");

    Ok(to)
}
