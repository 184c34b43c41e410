//! Per-stage lookup table.

use std::collections::HashMap;

use crate::traits::SearchState;

#[derive(Clone, Debug)]
pub struct TabularStages<S: SearchState> {
    stages: Vec<HashMap<S, f64>>,
}

impl<S: SearchState> TabularStages<S> {
    pub fn new(num_stages: usize) -> Self {
        Self {
            stages: vec![HashMap::new(); num_stages],
        }
    }

    pub fn get(&self, stage: usize, state: &S) -> Option<f64> {
        self.stages.get(stage).and_then(|table| table.get(state).copied())
    }

    pub fn set(&mut self, stage: usize, state: S, value: f64) {
        if stage >= self.stages.len() {
            self.stages.resize_with(stage + 1, HashMap::new);
        }
        self.stages[stage].insert(state, value);
    }

    pub fn len(&self, stage: usize) -> usize {
        self.stages.get(stage).map_or(0, HashMap::len)
    }

    pub fn states(&self, stage: usize) -> Vec<S> {
        self.stages
            .get(stage)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entries(&self, stage: usize) -> Vec<(&S, f64)> {
        self.stages
            .get(stage)
            .map(|table| table.iter().map(|(s, v)| (s, *v)).collect())
            .unwrap_or_default()
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn clear(&mut self) {
        self.stages.iter_mut().for_each(HashMap::clear);
    }
}
