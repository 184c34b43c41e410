use crate::action::ActionSelection;
use crate::backup::q_value;
use crate::bound::Envelope;
use crate::error::{Result, SearchError};
use crate::traits::World;

/// Evaluates every action the world offers and keeps the first maximizer.
///
/// Each action is scored with [`q_value`] against the bound's own values at
/// `t + 1`, so the cost is linear in the number of actions times the number
/// of successors. This is the default selection of every
/// [`BoundBuilder`](crate::builder::BoundBuilder).
#[derive(Clone, Copy, Debug, Default)]
pub struct Exhaustive;

impl<W: World> ActionSelection<W> for Exhaustive {
    /// Ties keep the action listed first by [`World::actions`].
    fn select(
        &mut self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        t: usize,
    ) -> Result<(W::Action, f64)> {
        let mut best: Option<(W::Action, f64)> = None;
        for action in world.actions(state, t)? {
            let value = q_value(world, envelope, state, &action, t)?;
            if best.as_ref().map_or(true, |(_, top)| value > *top) {
                best = Some((action, value));
            }
        }
        best.ok_or(SearchError::EmptyActionSpace { stage: t })
    }
}
