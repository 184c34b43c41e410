//! Max-plan (point-based) backup producing a new hyperplane.
//!
//! For every observation reachable from `(b, a)` the tightest next-stage
//! hyperplane at the successor belief is selected; the new hyperplane is
//! then defined at every point `x` by
//!
//! ```text
//! alpha(x) = r(x, a) + discount(t) * sum_{x', z} p(x', z | x, a) alpha_z(x')
//! ```

use std::collections::HashMap;

use crate::backup::{BackupOperator, BackupValue};
use crate::bound::{Envelope, Hyperplane, InitialValue};
use crate::error::{Result, SearchError};
use crate::traits::{PointOf, PwlcWorld, SearchState};

/// Point-based backup of hyperplane lower bounds.
///
/// Needs a stage-wise constant initial value: observations the belief
/// cannot produce fall back to it, and a relaxation-initialized bound is
/// rejected with [`SearchError::NotImplemented`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MaxPlanBackup;

impl<W: PwlcWorld> BackupOperator<W> for MaxPlanBackup {
    /// The returned hyperplane is defined at every point of
    /// [`PwlcWorld::points`] for stage `t`.
    fn backup(
        &self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        action: &W::Action,
        t: usize,
    ) -> Result<BackupValue<PointOf<W>>> {
        let mut successors: HashMap<W::Observation, Hyperplane<PointOf<W>>> = HashMap::new();
        for (observation, _) in world.observations(state, action, t)? {
            let next = world.next_state_given(state, action, &observation, t)?;
            let plane = envelope.best_hyperplane(&next, t + 1)?;
            successors.insert(observation, plane);
        }

        let discount = world.discount(t);
        let mut values = HashMap::new();
        for point in world.points(t) {
            let mut expected = 0.0;
            for (next_point, observation, probability) in world.point_dynamics(&point, action, t)? {
                if probability <= 0.0 {
                    continue;
                }
                // Points outside the belief can reach observations the belief
                // cannot; those fall back to the next-stage initial value.
                let value = match successors.get(&observation) {
                    Some(plane) => plane.value(&next_point),
                    None => fallback(envelope, t + 1)?,
                };
                expected += probability * value;
            }
            let value = world.point_reward(&point, action, t) + discount * expected;
            values.insert(point, value);
        }
        Ok(BackupValue::Hyperplane(Hyperplane::new(values, 0.0)))
    }

    fn name(&self) -> &'static str {
        "max_plan"
    }
}

/// Value of the implicit constant hyperplane at `t`.
fn fallback<S: SearchState>(envelope: &Envelope<S>, t: usize) -> Result<f64> {
    if envelope.horizon().is_terminal(t) {
        return Ok(0.0);
    }
    match envelope.initial() {
        InitialValue::Stages(values) => values
            .get(envelope.horizon().stage(t))
            .copied()
            .ok_or_else(|| {
                SearchError::world("max_plan backup", format!("no initial value at stage {t}"))
            }),
        InitialValue::Function(_) => Err(SearchError::NotImplemented(
            "hyperplane backup over a relaxation-initialized bound",
        )),
    }
}
