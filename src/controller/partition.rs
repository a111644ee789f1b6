/// Splits `total` across `weights` by largest remainder; shares always sum
/// to `total` (or are all zero when every weight is zero).
///
/// Ties on the remainder go to the earlier slot.
#[must_use]
pub fn partition_weighted(total: u64, weights: &[u64]) -> Vec<u64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let total_weight: u128 = weights.iter().map(|value| u128::from(*value)).sum();
    if total_weight == 0 {
        return vec![0; weights.len()];
    }

    let mut shares = vec![0u64; weights.len()];
    let mut remainders: Vec<(u128, usize)> = Vec::with_capacity(weights.len());
    let mut leftover = u128::from(total);
    for (idx, weight) in weights.iter().enumerate() {
        let scaled = u128::from(total).saturating_mul(u128::from(*weight));
        let share = scaled.checked_div(total_weight).unwrap_or(0);
        let remainder = scaled.checked_rem(total_weight).unwrap_or(0);
        if let Some(slot) = shares.get_mut(idx) {
            *slot = u64::try_from(share).unwrap_or(u64::MAX);
        }
        remainders.push((remainder, idx));
        leftover = leftover.saturating_sub(share);
    }

    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, idx) in remainders {
        if leftover == 0 {
            break;
        }
        if let Some(slot) = shares.get_mut(idx) {
            *slot = slot.saturating_add(1);
        }
        leftover = leftover.saturating_sub(1);
    }

    shares
}

/// Splits `total` peckers evenly over `spawners`.
#[must_use]
pub fn partition(total: u64, spawners: usize) -> Vec<u64> {
    partition_weighted(total, &vec![1; spawners])
}

/// Rescale ratio each spawner applies to reach its quota of `max_concurrency`.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "Rescale ratios are fractional by nature"
)]
pub fn rescale_ratio(quota: u64, max_concurrency: u64) -> f64 {
    if max_concurrency == 0 {
        return 0.0;
    }
    quota as f64 / max_concurrency as f64
}
