use crate::backup::{BackupOperator, BackupValue};
use crate::bound::Envelope;
use crate::error::Result;
use crate::traits::{PointOf, World};

/// `r(s, a, t) + discount(t) * sum_{s'} p(s' | s, a) V(s', t + 1)`.
pub fn q_value<W: World>(
    world: &W,
    envelope: &Envelope<W::State>,
    state: &W::State,
    action: &W::Action,
    t: usize,
) -> Result<f64> {
    let mut expected = 0.0;
    for (next, probability) in world.transitions(state, action, t)? {
        expected += probability * envelope.value_at(&next, t + 1);
    }
    Ok(world.reward(state, action, t) + world.discount(t) * expected)
}

/// One-step Bellman backup against the bound's own next-stage values.
///
/// Works with any [`World`]; the outcome is always a scalar, so it suits
/// tabular and point-set representations.
#[derive(Clone, Copy, Debug, Default)]
pub struct TabularBackup;

impl<W: World> BackupOperator<W> for TabularBackup {
    fn backup(
        &self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        action: &W::Action,
        t: usize,
    ) -> Result<BackupValue<PointOf<W>>> {
        q_value(world, envelope, state, action, t).map(BackupValue::Value)
    }

    fn name(&self) -> &'static str {
        "tabular"
    }
}
