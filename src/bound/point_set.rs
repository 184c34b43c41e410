//! Point-set bounds with sawtooth interpolation.
//!
//! Each stored witness `(s_k, v_k)` improves on the initial value `V0` at
//! `s_k`. At an arbitrary state `s` the improvement is scaled down by the
//! largest factor `c` such that `c * s_k <= s` pointwise:
//!
//! ```text
//! V(s) = V0(s) + tightest_k (v_k - V0(s_k)) * min_{x in supp(s_k)} s(x) / s_k(x)
//! ```
//!
//! A witness whose support is not contained in the support of `s` scales to
//! zero and does not contribute.

use std::collections::HashMap;

use crate::bound::Sense;
use crate::traits::SearchState;

/// A stored point together with the initial value it improves on.
#[derive(Clone, Debug)]
pub struct Witness<S: SearchState> {
    pub state: S,
    pub value: f64,
    /// `V0(state)` when the witness was stored.
    pub initial: f64,
    support: Vec<(S::Point, f64)>,
}

impl<S: SearchState> Witness<S> {
    pub fn new(state: S, value: f64, initial: f64) -> Self {
        let support = state.support();
        Self {
            state,
            value,
            initial,
            support,
        }
    }

    pub fn support(&self) -> &[(S::Point, f64)] {
        &self.support
    }

    /// `min_x s(x) / s_k(x)` over the witness support, zero when the support
    /// is not covered.
    pub fn ratio(&self, support: &HashMap<S::Point, f64>) -> f64 {
        let mut ratio = f64::INFINITY;
        for (point, weight) in &self.support {
            if *weight <= 0.0 {
                continue;
            }
            let mass = support.get(point).copied().unwrap_or(0.0);
            ratio = ratio.min(mass / weight);
            if ratio <= 0.0 {
                return 0.0;
            }
        }
        if ratio.is_finite() {
            ratio
        } else {
            0.0
        }
    }
}

fn correction<'a, S: SearchState>(
    witnesses: impl Iterator<Item = &'a Witness<S>>,
    support: &HashMap<S::Point, f64>,
    sense: Sense,
) -> f64 {
    witnesses.fold(0.0, |acc, witness| {
        let ratio = witness.ratio(support);
        if ratio > 0.0 {
            sense.tighter(acc, (witness.value - witness.initial) * ratio)
        } else {
            acc
        }
    })
}

#[derive(Clone, Debug)]
pub struct PointSet<S: SearchState> {
    stages: Vec<Vec<Witness<S>>>,
    index: Vec<HashMap<S, usize>>,
}

impl<S: SearchState> PointSet<S> {
    pub fn new(num_stages: usize) -> Self {
        Self {
            stages: vec![Vec::new(); num_stages],
            index: vec![HashMap::new(); num_stages],
        }
    }

    pub fn witnesses(&self, stage: usize) -> &[Witness<S>] {
        self.stages.get(stage).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self, stage: usize) -> usize {
        self.witnesses(stage).len()
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn evaluate(&self, stage: usize, state: &S, initial: f64, sense: Sense) -> f64 {
        let witnesses = self.witnesses(stage);
        if witnesses.is_empty() {
            return initial;
        }
        let support: HashMap<S::Point, f64> = state.support().into_iter().collect();
        initial + correction(witnesses.iter(), &support, sense)
    }

    /// Store `witness`, replacing any witness at the same state.
    pub fn insert(&mut self, stage: usize, witness: Witness<S>) {
        if stage >= self.stages.len() {
            self.stages.resize_with(stage + 1, Vec::new);
            self.index.resize_with(stage + 1, HashMap::new);
        }
        match self.index[stage].get(&witness.state) {
            Some(&position) => self.stages[stage][position] = witness,
            None => {
                self.index[stage].insert(witness.state.clone(), self.stages[stage].len());
                self.stages[stage].push(witness);
            }
        }
    }

    /// Drop every witness the remaining ones already match at its own state.
    /// Returns the number removed.
    pub fn prune(&mut self, stage: usize, sense: Sense) -> usize {
        let Some(witnesses) = self.stages.get_mut(stage) else {
            return 0;
        };
        let mut removed = vec![false; witnesses.len()];
        for k in 0..witnesses.len() {
            let support: HashMap<S::Point, f64> =
                witnesses[k].support.iter().cloned().collect();
            let others = witnesses
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != k && !removed[*j])
                .map(|(_, witness)| witness);
            let without = witnesses[k].initial + correction(others, &support, sense);
            if !sense.is_tighter(witnesses[k].value, without, 0.0) {
                removed[k] = true;
            }
        }

        let count = removed.iter().filter(|r| **r).count();
        if count > 0 {
            let mut flags = removed.into_iter();
            witnesses.retain(|_| !flags.next().unwrap_or(false));
            self.index[stage] = witnesses
                .iter()
                .enumerate()
                .map(|(position, witness)| (witness.state.clone(), position))
                .collect();
        }
        count
    }

    pub fn clear(&mut self) {
        self.stages.iter_mut().for_each(Vec::clear);
        self.index.iter_mut().for_each(HashMap::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    struct Dist(Vec<(u8, u32)>);

    impl Dist {
        fn of(weights: &[(u8, f64)]) -> Self {
            Dist(
                weights
                    .iter()
                    .map(|&(p, w)| (p, (w * 1_000.0).round() as u32))
                    .filter(|&(_, w)| w > 0)
                    .collect(),
            )
        }
    }

    impl SearchState for Dist {
        type Point = u8;
        fn support(&self) -> Vec<(u8, f64)> {
            self.0.iter().map(|&(p, w)| (p, w as f64 / 1_000.0)).collect()
        }
    }

    #[test]
    fn corner_witness_scales_linearly() {
        let mut set = PointSet::new(1);
        set.insert(0, Witness::new(Dist::of(&[(0, 1.0)]), 2.0, 10.0));
        let half = Dist::of(&[(0, 0.5), (1, 0.5)]);
        // 10 + (2 - 10) * 0.5
        assert!((set.evaluate(0, &half, 10.0, Sense::Upper) - 6.0).abs() < 1e-12);
        let other = Dist::of(&[(1, 1.0)]);
        assert_eq!(set.evaluate(0, &other, 10.0, Sense::Upper), 10.0);
    }

    #[test]
    fn uncovered_support_contributes_nothing() {
        let mut set = PointSet::new(1);
        set.insert(0, Witness::new(Dist::of(&[(0, 0.5), (1, 0.5)]), 0.0, 10.0));
        let corner = Dist::of(&[(0, 1.0)]);
        assert_eq!(set.evaluate(0, &corner, 10.0, Sense::Upper), 10.0);
    }

    #[test]
    fn prune_drops_dominated_witnesses() {
        let mut set = PointSet::new(1);
        set.insert(0, Witness::new(Dist::of(&[(0, 1.0)]), 2.0, 10.0));
        // at the midpoint the corner already gives 6; a witness at 7 is useless
        set.insert(0, Witness::new(Dist::of(&[(0, 0.5), (1, 0.5)]), 7.0, 10.0));
        set.insert(0, Witness::new(Dist::of(&[(1, 1.0)]), 4.0, 10.0));
        assert_eq!(set.prune(0, Sense::Upper), 1);
        assert_eq!(set.len(0), 2);
        let mid = Dist::of(&[(0, 0.5), (1, 0.5)]);
        assert!((set.evaluate(0, &mid, 10.0, Sense::Upper) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn reinserting_a_state_replaces_it() {
        let mut set = PointSet::new(1);
        let s = Dist::of(&[(0, 1.0)]);
        set.insert(0, Witness::new(s.clone(), 5.0, 10.0));
        set.insert(0, Witness::new(s.clone(), 3.0, 10.0));
        assert_eq!(set.len(0), 1);
        assert_eq!(set.evaluate(0, &s, 10.0, Sense::Upper), 3.0);
    }
}
