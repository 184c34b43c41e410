//! Backup operators: compute an improved value at `(state, t)` from the
//! bound's values at `t + 1`.

pub mod maxplan;
pub mod tabular;

use std::hash::Hash;

use crate::bound::{Envelope, Hyperplane};
use crate::error::Result;
use crate::traits::{PointOf, World};

pub use maxplan::MaxPlanBackup;
pub use tabular::{q_value, TabularBackup};

/// Result of a single backup: a scalar for pointwise representations, or a
/// hyperplane for hyperplane sets. A hyperplane stored into a pointwise
/// representation is evaluated at the backed-up state.
#[derive(Clone, Debug, PartialEq)]
pub enum BackupValue<P: Eq + Hash> {
    Value(f64),
    Hyperplane(Hyperplane<P>),
}

/// Computes an improved value at `(state, t)` under a fixed action.
///
/// Operators only read the bound; storing the outcome is left to
/// [`Bound::update_value_at_with`](crate::bound::Bound::update_value_at_with),
/// which also decides whether it tightens anything.
pub trait BackupOperator<W: World> {
    /// One backup of `action` at `(state, t)` against the envelope's values
    /// at `t + 1`.
    fn backup(
        &self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        action: &W::Action,
        t: usize,
    ) -> Result<BackupValue<PointOf<W>>>;

    /// Short label used in logs and dumps.
    fn name(&self) -> &'static str;
}
