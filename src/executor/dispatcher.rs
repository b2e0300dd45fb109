// Weighted command assignment across hosts

use tracing::debug;

use super::command::Command;
use super::pool::{DispatchPool, HostId};
use crate::output::errors::TodError;

/// Split `n` commands proportionally to `weights` (largest remainder method)
///
/// Every entry first gets `floor(w * n / total)`. The commands lost to
/// rounding go one each to the largest fractional remainders, earlier
/// entries winning ties. Zero weights count as one.
pub fn plan_shares(weights: &[u64], n: usize) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }

    let weights: Vec<u128> = weights.iter().map(|&w| u128::from(w.max(1))).collect();
    let total: u128 = weights.iter().sum();
    let n_wide = n as u128;

    let mut shares: Vec<usize> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(usize, u128)> = Vec::with_capacity(weights.len());

    for (i, &w) in weights.iter().enumerate() {
        let scaled = w * n_wide;
        shares.push((scaled / total) as usize);
        remainders.push((i, scaled % total));
    }

    let leftover = n - shares.iter().sum::<usize>();

    // Stable sort keeps insertion order among equal remainders
    remainders.sort_by(|a, b| b.1.cmp(&a.1));
    for &(i, _) in remainders.iter().take(leftover) {
        shares[i] += 1;
    }

    shares
}

/// Append contiguous slices of `commands` to the `eligible` hosts' queues
///
/// Returns how many commands each host received. Fails without touching
/// any queue when there is no eligible host.
pub fn assign(
    pool: &DispatchPool,
    commands: &[Command],
    eligible: &[HostId],
) -> Result<Vec<(HostId, usize)>, TodError> {
    if eligible.is_empty() {
        return Err(TodError::Assignment {
            message: "No connected host is left to receive commands".to_string(),
            pending: commands.len(),
        });
    }

    let weights: Vec<u64> = eligible
        .iter()
        .map(|&id| pool.slot(id).host.weight())
        .collect();
    let shares = plan_shares(&weights, commands.len());

    let mut offset = 0;
    let mut assigned = Vec::with_capacity(eligible.len());

    for (&id, &share) in eligible.iter().zip(&shares) {
        let slice = &commands[offset..offset + share];
        offset += share;

        if !slice.is_empty() {
            let slot = pool.slot(id);
            slot.push_commands(slice);
            debug!(host = %slot.name(), count = share, "assigned commands");
        }
        assigned.push((id, share));
    }

    Ok(assigned)
}
