//! Distinct-index random sampling of a timing series.

use rand::Rng;
use rand::RngExt;

use crate::error::{CampaignError, Result};

/// Number of indices drawn per channel of every series.
pub const SAMPLE_SIZE: usize = 8;

/// Upper bound on draws before giving up. With at least [`SAMPLE_SIZE`]
/// candidates the expected number of draws is below 22, so reaching this
/// means the generator is broken.
const MAX_DRAWS: usize = 1 << 16;

/// [`SAMPLE_SIZE`] distinct indices, sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSet([usize; SAMPLE_SIZE]);

impl SampleSet {
    pub fn indices(&self) -> &[usize; SAMPLE_SIZE] {
        &self.0
    }

    /// Builds a set from explicit indices, which must be strictly ascending.
    pub fn from_sorted(indices: [usize; SAMPLE_SIZE]) -> Result<Self> {
        if indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CampaignError::Sampling(format!(
                "indices {indices:?} are not strictly ascending"
            )));
        }
        Ok(Self(indices))
    }

    /// Pairs every index with its value in `values`.
    pub fn pick(&self, values: &[u64]) -> Result<Vec<(usize, u64)>> {
        self.0
            .iter()
            .map(|&idx| {
                values.get(idx).map(|&v| (idx, v)).ok_or_else(|| {
                    CampaignError::Sampling(format!(
                        "index {idx} out of range for {} samples",
                        values.len()
                    ))
                })
            })
            .collect()
    }
}

/// Picks [`SAMPLE_SIZE`] distinct indices uniformly from `[0, len - 1]`.
///
/// Draws with rejection on collision and returns the indices sorted.
/// Fails instead of looping when `len < SAMPLE_SIZE`.
pub fn pick_sample(len: usize, rng: &mut impl Rng) -> Result<SampleSet> {
    if len < SAMPLE_SIZE {
        return Err(CampaignError::Sampling(format!(
            "need at least {SAMPLE_SIZE} samples, series has {len}"
        )));
    }

    let mut picked = [0usize; SAMPLE_SIZE];
    let mut count = 0;
    let mut draws = 0;

    while count < SAMPLE_SIZE {
        if draws == MAX_DRAWS {
            return Err(CampaignError::Sampling(format!(
                "no {SAMPLE_SIZE} distinct indices after {MAX_DRAWS} draws"
            )));
        }
        draws += 1;

        let idx = rng.random_range(0..len);
        if picked[..count].contains(&idx) {
            continue;
        }
        picked[count] = idx;
        count += 1;
    }

    picked.sort_unstable();
    Ok(SampleSet(picked))
}
