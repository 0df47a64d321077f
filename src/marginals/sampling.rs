//! Deterministic stratified subsampling for the AME path.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::types::{ChoicePanelRow, HasNudge};

/// Sorted row indices of a stratified subsample of `target` rows.
///
/// Strata are (model, has_nudge, category). Each stratum gets the floor of
/// its proportional share, and the rows left over go to the strata with the
/// largest fractional remainders (ties in stratum order). Panels no larger
/// than `target` are returned whole. The same seed always gives the same
/// sample.
pub fn stratified_sample(rows: &[ChoicePanelRow], target: usize, seed: u64) -> Vec<usize> {
    let n = rows.len();
    if n <= target {
        return (0..n).collect();
    }

    let mut strata: BTreeMap<(&str, HasNudge, &str), Vec<usize>> = BTreeMap::new();
    for (i, r) in rows.iter().enumerate() {
        strata
            .entry((r.model.as_str(), r.has_nudge, r.category.as_str()))
            .or_default()
            .push(i);
    }

    let mut alloc: Vec<usize> = Vec::with_capacity(strata.len());
    let mut remainders: Vec<(usize, usize)> = Vec::with_capacity(strata.len());
    for (s, members) in strata.values().enumerate() {
        let exact = members.len() * target;
        alloc.push(exact / n);
        remainders.push((exact % n, s));
    }
    let leftover = target - alloc.iter().sum::<usize>();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, s) in remainders.iter().take(leftover) {
        alloc[s] += 1;
    }

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut sample = Vec::with_capacity(target);
    for (members, take) in strata.into_values().zip(alloc) {
        let mut members = members;
        members.shuffle(&mut rng);
        sample.extend(members.into_iter().take(take));
    }
    sample.sort_unstable();
    sample
}
