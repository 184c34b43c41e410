//! Lower and upper bounds on the optimal value function.
//!
//! A [`Bound`] pairs an [`Envelope`] (the stored values plus the initial
//! value they improve on) with the operators that tighten it: a backup
//! operator producing new values and an action-selection operator producing
//! greedy actions. The envelope is the read side shared with those
//! operators; the bound owns the write side.
//!
//! Three representations are supported:
//! - [`Representation::Tabular`]: exact per-state values, for fully
//!   observable states.
//! - [`Representation::PointSet`]: witnesses with sawtooth interpolation,
//!   suited to upper bounds over distributions.
//! - [`Representation::Hyperplanes`]: alpha-vectors, suited to lower bounds
//!   of convex value functions.

pub mod hyperplane;
pub mod point_set;
pub mod tabular;

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::action::ActionSelection;
use crate::backup::{BackupOperator, BackupValue};
use crate::config::VALUE_DECIMAL_PRINT;
use crate::error::{Result, SearchError};
use crate::initializer::Initializer;
use crate::traits::{Horizon, SearchState, World};

pub use hyperplane::{Hyperplane, HyperplaneSet};
pub use point_set::{PointSet, Witness};
pub use tabular::TabularStages;

/// Direction a bound approaches the optimal value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sense {
    Lower,
    Upper,
}

impl Sense {
    /// The tighter of two values: larger for lower bounds, smaller for upper.
    #[inline]
    pub fn tighter(self, a: f64, b: f64) -> f64 {
        match self {
            Sense::Lower => a.max(b),
            Sense::Upper => a.min(b),
        }
    }

    /// Whether `candidate` improves on `current` by more than `precision`.
    #[inline]
    pub fn is_tighter(self, candidate: f64, current: f64, precision: f64) -> bool {
        match self {
            Sense::Lower => candidate > current + precision,
            Sense::Upper => candidate < current - precision,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Sense::Lower => "lower_bound",
            Sense::Upper => "upper_bound",
        }
    }
}

/// Value function of a relaxed problem, used as an initial bound.
pub trait Relaxation<S> {
    fn value(&self, state: &S, t: usize) -> f64;
}

impl<S, F> Relaxation<S> for F
where
    F: Fn(&S, usize) -> f64,
{
    fn value(&self, state: &S, t: usize) -> f64 {
        self(state, t)
    }
}

/// What a bound reads where nothing better has been stored.
pub enum InitialValue<S> {
    /// One constant per stage.
    Stages(Vec<f64>),
    Function(Rc<dyn Relaxation<S>>),
}

impl<S> Clone for InitialValue<S> {
    fn clone(&self) -> Self {
        match self {
            InitialValue::Stages(values) => InitialValue::Stages(values.clone()),
            InitialValue::Function(f) => InitialValue::Function(Rc::clone(f)),
        }
    }
}

impl<S> fmt::Debug for InitialValue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialValue::Stages(values) => f.debug_tuple("Stages").field(values).finish(),
            InitialValue::Function(_) => f.write_str("Function(..)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RepresentationKind {
    Tabular,
    PointSet,
    Hyperplanes,
}

impl RepresentationKind {
    pub fn label(self) -> &'static str {
        match self {
            RepresentationKind::Tabular => "tabular",
            RepresentationKind::PointSet => "point_set",
            RepresentationKind::Hyperplanes => "hyperplanes",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Representation<S: SearchState> {
    Tabular(TabularStages<S>),
    PointSet(PointSet<S>),
    Hyperplanes(HyperplaneSet<S>),
}

impl<S: SearchState> Representation<S> {
    pub fn new(kind: RepresentationKind, num_stages: usize) -> Self {
        match kind {
            RepresentationKind::Tabular => Representation::Tabular(TabularStages::new(num_stages)),
            RepresentationKind::PointSet => Representation::PointSet(PointSet::new(num_stages)),
            RepresentationKind::Hyperplanes => {
                Representation::Hyperplanes(HyperplaneSet::new(num_stages))
            }
        }
    }

    pub fn kind(&self) -> RepresentationKind {
        match self {
            Representation::Tabular(_) => RepresentationKind::Tabular,
            Representation::PointSet(_) => RepresentationKind::PointSet,
            Representation::Hyperplanes(_) => RepresentationKind::Hyperplanes,
        }
    }

    fn len(&self, stage: usize) -> usize {
        match self {
            Representation::Tabular(table) => table.len(stage),
            Representation::PointSet(points) => points.len(stage),
            Representation::Hyperplanes(planes) => planes.len(stage),
        }
    }

    fn clear(&mut self) {
        match self {
            Representation::Tabular(table) => table.clear(),
            Representation::PointSet(points) => points.clear(),
            Representation::Hyperplanes(planes) => planes.clear(),
        }
    }
}

/// Stored values of one bound together with its initial value.
#[derive(Clone, Debug)]
pub struct Envelope<S: SearchState> {
    sense: Sense,
    horizon: Horizon,
    precision: f64,
    initial: InitialValue<S>,
    representation: Representation<S>,
}

impl<S: SearchState> Envelope<S> {
    pub fn new(sense: Sense, horizon: Horizon, kind: RepresentationKind, precision: f64) -> Self {
        let stages = horizon.num_stages();
        Self {
            sense,
            horizon,
            precision,
            initial: InitialValue::Stages(vec![0.0; stages]),
            representation: Representation::new(kind, stages),
        }
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    pub fn kind(&self) -> RepresentationKind {
        self.representation.kind()
    }

    pub fn initial(&self) -> &InitialValue<S> {
        &self.initial
    }

    pub fn representation(&self) -> &Representation<S> {
        &self.representation
    }

    pub fn initial_value(&self, state: &S, t: usize) -> f64 {
        if self.horizon.is_terminal(t) {
            return 0.0;
        }
        match &self.initial {
            InitialValue::Stages(values) => {
                values.get(self.horizon.stage(t)).copied().unwrap_or(0.0)
            }
            InitialValue::Function(relaxation) => relaxation.value(state, t),
        }
    }

    pub fn value_at(&self, state: &S, t: usize) -> f64 {
        if self.horizon.is_terminal(t) {
            return 0.0;
        }
        let stage = self.horizon.stage(t);
        let initial = self.initial_value(state, t);
        match &self.representation {
            Representation::Tabular(table) => table.get(stage, state).unwrap_or(initial),
            Representation::PointSet(points) => points.evaluate(stage, state, initial, self.sense),
            Representation::Hyperplanes(planes) => planes
                .evaluate(stage, state, self.sense)
                .map_or(initial, |value| self.sense.tighter(value, initial)),
        }
    }

    /// Witnesses stored at `t`; empty for other representations and for the
    /// terminal stage.
    pub fn witnesses(&self, t: usize) -> &[Witness<S>] {
        if self.horizon.is_terminal(t) {
            return &[];
        }
        match &self.representation {
            Representation::PointSet(points) => points.witnesses(self.horizon.stage(t)),
            _ => &[],
        }
    }

    /// Tightest hyperplane at `(state, t)`, counting the initial constant and
    /// the zero terminal value as hyperplanes.
    pub fn best_hyperplane(&self, state: &S, t: usize) -> Result<Hyperplane<S::Point>> {
        if self.horizon.is_terminal(t) {
            return Ok(Hyperplane::constant(0.0));
        }
        let stage = self.horizon.stage(t);
        let initial = match &self.initial {
            InitialValue::Stages(values) => values.get(stage).copied().unwrap_or(0.0),
            InitialValue::Function(_) => {
                return Err(SearchError::NotImplemented(
                    "hyperplane backup over a relaxation-initialized bound",
                ))
            }
        };
        let Representation::Hyperplanes(planes) = &self.representation else {
            return Err(SearchError::NotImplemented(
                "hyperplane backup outside a hyperplane representation",
            ));
        };
        match planes.best(stage, &state.support(), self.sense) {
            Some((plane, value)) if self.sense.is_tighter(value, initial, 0.0) => Ok(plane.clone()),
            _ => Ok(Hyperplane::constant(initial)),
        }
    }

    /// States carrying stored information at `t`.
    pub fn support(&self, t: usize) -> Vec<S> {
        let stage = self.horizon.stage(t);
        match &self.representation {
            Representation::Tabular(table) => table.states(stage),
            Representation::PointSet(points) => points
                .witnesses(stage)
                .iter()
                .map(|w| w.state.clone())
                .collect(),
            Representation::Hyperplanes(planes) => {
                planes.planes(stage).iter().map(|(s, _)| s.clone()).collect()
            }
        }
    }

    pub fn size_at(&self, t: usize) -> usize {
        self.representation.len(self.horizon.stage(t))
    }

    pub fn size(&self) -> usize {
        (0..self.horizon.num_stages())
            .map(|stage| self.representation.len(stage))
            .sum()
    }

    /// Store a backup outcome at `(state, t)`. Returns whether anything was
    /// stored: point sets only keep values that tighten the bound, and
    /// hyperplane sets skip planes an existing plane already dominates.
    pub fn store(&mut self, state: &S, t: usize, outcome: BackupValue<S::Point>) -> Result<bool> {
        if self.horizon.is_terminal(t) {
            return Ok(false);
        }
        let stage = self.horizon.stage(t);
        let current = self.value_at(state, t);
        let initial = self.initial_value(state, t);
        let (sense, precision) = (self.sense, self.precision);

        let value = match (&mut self.representation, outcome) {
            (Representation::Hyperplanes(planes), BackupValue::Hyperplane(plane)) => {
                if planes.covers(stage, &plane, sense, precision) {
                    return Ok(false);
                }
                planes.insert(stage, state.clone(), plane);
                return Ok(true);
            }
            (Representation::Hyperplanes(_), BackupValue::Value(_)) => {
                return Err(SearchError::NotImplemented(
                    "scalar backup into a hyperplane representation",
                ))
            }
            (_, BackupValue::Value(value)) => value,
            (_, BackupValue::Hyperplane(plane)) => plane.dot(&state.support()),
        };

        match &mut self.representation {
            Representation::Tabular(table) => {
                table.set(stage, state.clone(), value);
                Ok(true)
            }
            Representation::PointSet(points) if sense.is_tighter(value, current, precision) => {
                points.insert(stage, Witness::new(state.clone(), value, initial));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn prune(&mut self, t: usize) -> usize {
        let stage = self.horizon.stage(t);
        match &mut self.representation {
            Representation::Tabular(_) => 0,
            Representation::PointSet(points) => points.prune(stage, self.sense),
            Representation::Hyperplanes(planes) => planes.prune(stage, self.sense, self.precision),
        }
    }

    pub fn set_initial(&mut self, value: f64, t: usize) {
        let stages = self.horizon.num_stages();
        if let InitialValue::Function(_) = self.initial {
            self.initial = InitialValue::Stages(vec![0.0; stages]);
        }
        if let InitialValue::Stages(values) = &mut self.initial {
            let stage = self.horizon.stage(t);
            if stage >= values.len() {
                values.resize(stage + 1, 0.0);
            }
            values[stage] = value;
        }
    }

    fn reset(&mut self, initial: InitialValue<S>) {
        self.initial = initial;
        self.representation.clear();
    }
}

impl<S: SearchState> fmt::Display for Envelope<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = VALUE_DECIMAL_PRINT;
        writeln!(
            f,
            "<{} representation=\"{}\" horizon=\"{:?}\">",
            self.sense.label(),
            self.kind().label(),
            self.horizon
        )?;
        for stage in 0..self.horizon.num_stages() {
            if self.representation.len(stage) == 0 {
                continue;
            }
            writeln!(f, "  <stage t=\"{stage}\">")?;
            match &self.representation {
                Representation::Tabular(table) => {
                    for (state, value) in table.entries(stage) {
                        writeln!(f, "    {state:?} -> {value:.prec$}")?;
                    }
                }
                Representation::PointSet(points) => {
                    for witness in points.witnesses(stage) {
                        writeln!(
                            f,
                            "    {:?} -> {:.prec$} (initial {:.prec$})",
                            witness.state, witness.value, witness.initial
                        )?;
                    }
                }
                Representation::Hyperplanes(planes) => {
                    for (state, plane) in planes.planes(stage) {
                        writeln!(f, "    {state:?} -> {plane}")?;
                    }
                }
            }
            writeln!(f, "  </stage>")?;
        }
        write!(f, "</{}>", self.sense.label())
    }
}

/// A value-function bound with its update operators.
pub struct Bound<W: World> {
    envelope: Envelope<W::State>,
    initializer: Option<Initializer<W::State>>,
    backup: Box<dyn BackupOperator<W>>,
    selection: Box<dyn ActionSelection<W>>,
    pruning_frequency: Option<usize>,
    updates: usize,
}

impl<W: World> Bound<W> {
    pub fn new(
        envelope: Envelope<W::State>,
        initializer: Option<Initializer<W::State>>,
        backup: Box<dyn BackupOperator<W>>,
        selection: Box<dyn ActionSelection<W>>,
        pruning_frequency: Option<usize>,
    ) -> Self {
        Self {
            envelope,
            initializer,
            backup,
            selection,
            pruning_frequency: pruning_frequency.filter(|&every| every > 0),
            updates: 0,
        }
    }

    pub fn envelope(&self) -> &Envelope<W::State> {
        &self.envelope
    }

    pub fn sense(&self) -> Sense {
        self.envelope.sense()
    }

    pub fn horizon(&self) -> Horizon {
        self.envelope.horizon()
    }

    pub fn is_infinite_horizon(&self) -> bool {
        self.envelope.horizon().is_infinite()
    }

    pub fn kind(&self) -> RepresentationKind {
        self.envelope.kind()
    }

    pub fn backup_name(&self) -> &'static str {
        self.backup.name()
    }

    pub fn pruning_frequency(&self) -> Option<usize> {
        self.pruning_frequency
    }

    /// Clear stored values and compute the initial value. Without an
    /// initializer every stage starts at zero.
    pub fn initialize(&mut self, world: &W) -> Result<()> {
        let horizon = self.horizon();
        let initial = match &self.initializer {
            Some(initializer) => initializer.initial_value(world, horizon, self.sense())?,
            None => InitialValue::Stages(vec![0.0; horizon.num_stages()]),
        };
        debug!(bound = self.sense().label(), initial = ?initial, "initialized");
        self.envelope.reset(initial);
        self.updates = 0;
        Ok(())
    }

    pub fn set_initial(&mut self, value: f64, t: usize) {
        self.envelope.set_initial(value, t);
    }

    #[inline]
    pub fn value_at(&self, state: &W::State, t: usize) -> f64 {
        self.envelope.value_at(state, t)
    }

    #[inline]
    pub fn initial_value(&self, state: &W::State, t: usize) -> f64 {
        self.envelope.initial_value(state, t)
    }

    /// Back up `(state, t)` under the bound's own greedy action.
    pub fn update_value_at(&mut self, world: &W, state: &W::State, t: usize) -> Result<()> {
        if self.horizon().is_terminal(t) {
            return Ok(());
        }
        let action = self.best_action(world, state, t)?;
        self.update_value_at_with(world, state, &action, t)
    }

    pub fn update_value_at_with(
        &mut self,
        world: &W,
        state: &W::State,
        action: &W::Action,
        t: usize,
    ) -> Result<()> {
        if self.horizon().is_terminal(t) {
            return Ok(());
        }
        let outcome = self.backup.backup(world, &self.envelope, state, action, t)?;
        let stored = self.envelope.store(state, t, outcome)?;
        trace!(bound = self.sense().label(), t, stored, "backup");
        self.updates += 1;
        if let Some(every) = self.pruning_frequency {
            if self.updates % every == 0 {
                self.prune(t);
            }
        }
        Ok(())
    }

    pub fn best_action(&mut self, world: &W, state: &W::State, t: usize) -> Result<W::Action> {
        self.best_action_and_value(world, state, t)
            .map(|(action, _)| action)
    }

    pub fn best_action_and_value(
        &mut self,
        world: &W,
        state: &W::State,
        t: usize,
    ) -> Result<(W::Action, f64)> {
        self.selection.select(world, &self.envelope, state, t)
    }

    pub fn support(&self, t: usize) -> Vec<W::State> {
        self.envelope.support(t)
    }

    pub fn size_at(&self, t: usize) -> usize {
        self.envelope.size_at(t)
    }

    pub fn size(&self) -> usize {
        self.envelope.size()
    }

    pub fn prune(&mut self, t: usize) -> usize {
        let removed = self.envelope.prune(t);
        if removed > 0 {
            debug!(bound = self.sense().label(), t, removed, "pruned");
        }
        removed
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let _ = path;
        Err(SearchError::NotImplemented("saving a bound"))
    }

    pub fn load(&mut self, path: &Path) -> Result<()> {
        let _ = path;
        Err(SearchError::NotImplemented("loading a bound"))
    }
}

impl<W: World> fmt::Display for Bound<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.envelope, f)
    }
}
