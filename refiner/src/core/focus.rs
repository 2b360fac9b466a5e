//! Focus-factor lifecycle: selection at round 0, graduation afterwards.

use serde::Serialize;

use crate::core::types::{Dimension, Scores};

/// Dimensions selected for targeted improvement.
///
/// `frozen` is fixed at round 0 and serves as the regression baseline.
/// `active` starts equal to `frozen` and only shrinks as dimensions graduate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FocusFactors {
    frozen: Option<[Dimension; 2]>,
    active: Vec<Dimension>,
}

impl FocusFactors {
    pub fn frozen(&self) -> Option<[Dimension; 2]> {
        self.frozen
    }

    pub fn active(&self) -> &[Dimension] {
        &self.active
    }

    pub fn is_frozen(&self, dim: Dimension) -> bool {
        self.frozen.is_some_and(|frozen| frozen.contains(&dim))
    }

    /// Update focus factors from a completed evaluation round.
    ///
    /// The first call freezes the two lowest-scoring dimensions (ties broken by
    /// declaration order). Later calls graduate active dimensions that reached
    /// `threshold`. Returns the dimensions graduated by this call.
    pub fn observe_round(&mut self, scores: &Scores, threshold: u8) -> Vec<Dimension> {
        if self.frozen.is_none() {
            let selected = lowest_two(scores);
            self.frozen = Some(selected);
            self.active = selected.to_vec();
            return Vec::new();
        }

        let (graduated, still_active): (Vec<Dimension>, Vec<Dimension>) = self
            .active
            .iter()
            .partition(|dim| scores.get(**dim) >= threshold);
        self.active = still_active;
        graduated
    }

    /// Replace both sets from a stored snapshot. Only rollback uses this.
    pub(crate) fn restore(&mut self, snapshot: &FocusFactors) {
        self.frozen = snapshot.frozen;
        self.active = snapshot.active.clone();
    }
}

fn lowest_two(scores: &Scores) -> [Dimension; 2] {
    let mut ranked: Vec<(u8, Dimension)> = scores.iter().map(|(dim, score)| (score, dim)).collect();
    ranked.sort();
    [ranked[0].1, ranked[1].1]
}
