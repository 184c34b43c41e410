//! Greedy action selection with respect to a bound.

mod decentralized;
pub mod exhaustive;
pub mod sawtooth;

use crate::bound::Envelope;
use crate::error::Result;
use crate::traits::World;

pub use exhaustive::Exhaustive;
pub use sawtooth::SawtoothLp;

/// Picks the greedy action of a bound.
///
/// Implementations read the bound through its [`Envelope`] and may keep
/// state of their own between calls, which is why `select` takes
/// `&mut self`. [`Bound::update_value_at`](crate::bound::Bound::update_value_at)
/// backs up the returned action, and the default
/// [`World::select_next_action`] asks the upper bound.
pub trait ActionSelection<W: World> {
    /// Greedy action at `(state, t)` together with the value the bound
    /// assigns it. Fails with [`SearchError::EmptyActionSpace`] when the
    /// world offers no action.
    ///
    /// [`SearchError::EmptyActionSpace`]: crate::error::SearchError::EmptyActionSpace
    fn select(
        &mut self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        t: usize,
    ) -> Result<(W::Action, f64)>;
}
