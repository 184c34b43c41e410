//! Hyperplane (alpha-vector) bounds.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::bound::Sense;
use crate::traits::SearchState;

/// A linear function over points. Points absent from `values` take
/// `default`, which makes a constant function an empty map.
#[derive(Clone, Debug, PartialEq)]
pub struct Hyperplane<P: Eq + Hash> {
    values: HashMap<P, f64>,
    default: f64,
}

impl<P: Eq + Hash + Clone> Hyperplane<P> {
    pub fn new(values: HashMap<P, f64>, default: f64) -> Self {
        Self { values, default }
    }

    pub fn constant(value: f64) -> Self {
        Self {
            values: HashMap::new(),
            default: value,
        }
    }

    #[inline]
    pub fn value(&self, point: &P) -> f64 {
        self.values.get(point).copied().unwrap_or(self.default)
    }

    pub fn dot(&self, support: &[(P, f64)]) -> f64 {
        support.iter().map(|(point, w)| w * self.value(point)).sum()
    }

    /// Whether `self` is at least as tight as `other` at every point.
    pub fn dominates(&self, other: &Self, sense: Sense, precision: f64) -> bool {
        let keys: HashSet<&P> = self.values.keys().chain(other.values.keys()).collect();
        let as_tight = |mine: f64, theirs: f64| !sense.is_tighter(theirs, mine, precision);
        as_tight(self.default, other.default)
            && keys
                .into_iter()
                .all(|point| as_tight(self.value(point), other.value(point)))
    }
}

impl<P: Eq + Hash + Ord + fmt::Debug> fmt::Display for Hyperplane<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&P, &f64)> = self.values.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        write!(f, "[")?;
        for (i, (point, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{point:?}: {value:.prec$}", prec = crate::config::VALUE_DECIMAL_PRINT)?;
        }
        write!(
            f,
            "] default {:.prec$}",
            self.default,
            prec = crate::config::VALUE_DECIMAL_PRINT
        )
    }
}

#[derive(Clone, Debug)]
pub struct HyperplaneSet<S: SearchState> {
    stages: Vec<Vec<(S, Hyperplane<S::Point>)>>,
}

impl<S: SearchState> HyperplaneSet<S> {
    pub fn new(num_stages: usize) -> Self {
        Self {
            stages: vec![Vec::new(); num_stages],
        }
    }

    pub fn planes(&self, stage: usize) -> &[(S, Hyperplane<S::Point>)] {
        self.stages.get(stage).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self, stage: usize) -> usize {
        self.planes(stage).len()
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Tightest stored hyperplane at `support` and its value there.
    pub fn best(
        &self,
        stage: usize,
        support: &[(S::Point, f64)],
        sense: Sense,
    ) -> Option<(&Hyperplane<S::Point>, f64)> {
        let mut best: Option<(&Hyperplane<S::Point>, f64)> = None;
        for (_, plane) in self.planes(stage) {
            let value = plane.dot(support);
            if best.map_or(true, |(_, top)| sense.is_tighter(value, top, 0.0)) {
                best = Some((plane, value));
            }
        }
        best
    }

    pub fn evaluate(&self, stage: usize, state: &S, sense: Sense) -> Option<f64> {
        self.best(stage, &state.support(), sense).map(|(_, value)| value)
    }

    /// Whether some stored plane at `stage` is at least as tight as `plane`
    /// everywhere.
    pub fn covers(&self, stage: usize, plane: &Hyperplane<S::Point>, sense: Sense, precision: f64) -> bool {
        self.planes(stage)
            .iter()
            .any(|(_, stored)| stored.dominates(plane, sense, precision))
    }

    pub fn insert(&mut self, stage: usize, witness: S, plane: Hyperplane<S::Point>) {
        if stage >= self.stages.len() {
            self.stages.resize_with(stage + 1, Vec::new);
        }
        self.stages[stage].push((witness, plane));
    }

    /// Remove pointwise-dominated hyperplanes; of two equal ones the later
    /// survives. Returns the number removed.
    pub fn prune(&mut self, stage: usize, sense: Sense, precision: f64) -> usize {
        let Some(planes) = self.stages.get_mut(stage) else {
            return 0;
        };
        let mut removed = vec![false; planes.len()];
        for k in 0..planes.len() {
            let dominated = (0..planes.len()).any(|j| {
                j != k && !removed[j] && planes[j].1.dominates(&planes[k].1, sense, precision)
            });
            removed[k] = dominated;
        }
        let count = removed.iter().filter(|r| **r).count();
        let mut flags = removed.into_iter();
        planes.retain(|_| !flags.next().unwrap_or(false));
        count
    }

    pub fn clear(&mut self) {
        self.stages.iter_mut().for_each(Vec::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    struct Point(u8);

    impl SearchState for Point {
        type Point = u8;
        fn support(&self) -> Vec<(u8, f64)> {
            vec![(self.0, 1.0)]
        }
    }

    fn plane(values: &[(u8, f64)]) -> Hyperplane<u8> {
        Hyperplane::new(values.iter().copied().collect(), 0.0)
    }

    #[test]
    fn dot_uses_default_for_missing_points() {
        let h = Hyperplane::new([(0u8, 2.0)].into_iter().collect(), -1.0);
        assert_eq!(h.dot(&[(0, 0.5), (1, 0.5)]), 0.5);
    }

    #[test]
    fn best_respects_sense() {
        let mut set = HyperplaneSet::new(1);
        set.insert(0, Point(0), plane(&[(0, 1.0), (1, 3.0)]));
        set.insert(0, Point(1), plane(&[(0, 2.0), (1, 0.0)]));
        let support = [(0u8, 0.5), (1u8, 0.5)];
        assert_eq!(set.best(0, &support, Sense::Lower).map(|(_, v)| v), Some(2.0));
        assert_eq!(set.best(0, &support, Sense::Upper).map(|(_, v)| v), Some(1.0));
    }

    #[test]
    fn covers_detects_dominated_candidates() {
        let mut set = HyperplaneSet::new(1);
        set.insert(0, Point(0), plane(&[(0, 1.0), (1, 1.0)]));
        assert!(set.covers(0, &plane(&[(0, 1.0), (1, 1.0)]), Sense::Lower, 1e-12));
        assert!(set.covers(0, &plane(&[(0, 0.5), (1, 1.0)]), Sense::Lower, 1e-12));
        assert!(!set.covers(0, &plane(&[(0, 2.0), (1, -1.0)]), Sense::Lower, 1e-12));
        assert!(!set.covers(0, &plane(&[(0, 0.5), (1, 1.0)]), Sense::Upper, 1e-12));
    }

    #[test]
    fn prune_keeps_one_of_equal_planes() {
        let mut set = HyperplaneSet::new(1);
        set.insert(0, Point(0), plane(&[(0, 1.0), (1, 1.0)]));
        set.insert(0, Point(1), plane(&[(0, 1.0), (1, 1.0)]));
        set.insert(0, Point(0), plane(&[(0, 0.5), (1, 0.5)]));
        set.insert(0, Point(1), plane(&[(0, 2.0), (1, -1.0)]));
        assert_eq!(set.prune(0, Sense::Lower, 1e-12), 2);
        assert_eq!(set.len(0), 2);
    }
}
