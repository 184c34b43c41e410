//! Collaborator interfaces between the search core and a decision process.
//!
//! The engine never looks inside a state: it asks the [`World`] for
//! actions, rewards and successors, and it asks a state for its support when a
//! representation needs to interpolate. Worlds whose value function is
//! piecewise-linear and convex over that support additionally implement
//! [`PwlcWorld`] (max-plan backups), and occupancy-MDP reformulations of
//! decentralized problems implement [`OccupancyWorld`] (sawtooth LP action
//! selection).

use std::fmt::Debug;
use std::hash::Hash;

use crate::bound::Bound;
use crate::error::{Result, SearchError};

/// Planning horizon of a world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Horizon {
    /// Stages `0..H` carry decisions; stage `H` is terminal with value 0.
    Finite(usize),
    /// A single stationary stage.
    Infinite,
}

impl Horizon {
    #[inline]
    pub fn is_infinite(self) -> bool {
        matches!(self, Horizon::Infinite)
    }

    /// Storage index for decision epoch `t`.
    #[inline]
    pub fn stage(self, t: usize) -> usize {
        match self {
            Horizon::Finite(_) => t,
            Horizon::Infinite => 0,
        }
    }

    /// Number of stored stages, terminal stage included.
    #[inline]
    pub fn num_stages(self) -> usize {
        match self {
            Horizon::Finite(h) => h + 1,
            Horizon::Infinite => 1,
        }
    }

    #[inline]
    pub fn is_terminal(self, t: usize) -> bool {
        match self {
            Horizon::Finite(h) => t >= h,
            Horizon::Infinite => false,
        }
    }
}

/// A search state. Equality and hashing must be structural (identical
/// distributions compare equal).
pub trait SearchState: Clone + Eq + Hash + Debug + 'static {
    /// Elementary point of the support (hidden state, or hidden state paired
    /// with a joint history).
    type Point: Clone + Eq + Hash + Ord + Debug + 'static;

    /// `(point, weight)` pairs with positive weight. A fully observable state
    /// returns itself with weight one.
    fn support(&self) -> Vec<(Self::Point, f64)>;
}

pub type PointOf<W> = <<W as World>::State as SearchState>::Point;

/// Immediate rewards at a stage, one row per action and one column per
/// underlying state.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardTable {
    rows: Vec<Vec<f64>>,
}

impl RewardTable {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn min(&self) -> f64 {
        self.rows
            .iter()
            .flatten()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.rows
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Best guaranteed reward of a single action played blindly:
    /// `max_a min_s r(s, a)`.
    pub fn blind(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| row.iter().copied().fold(f64::INFINITY, f64::min))
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Read-only view of both bounds, handed to next-state selection.
pub struct BoundPair<'a, W: World> {
    pub lower: &'a Bound<W>,
    pub upper: &'a Bound<W>,
}

impl<'a, W: World> BoundPair<'a, W> {
    /// Gap between the bounds at `(state, t)`.
    pub fn width(&self, state: &W::State, t: usize) -> f64 {
        self.upper.value_at(state, t) - self.lower.value_at(state, t)
    }
}

/// A sequential decision process as seen by the search.
///
/// Rewards are maximized. Discounts are indexed by decision epoch; the
/// cumulative weight of epoch `t` is `weighted_discount(t)`.
pub trait World: Sized {
    type State: SearchState;
    type Action: Clone + Eq + Hash + Debug + 'static;

    fn initial_state(&self) -> Self::State;

    fn horizon(&self) -> Horizon;

    fn discount(&self, t: usize) -> f64;

    /// Product of the discounts of every epoch before `t`.
    fn weighted_discount(&self, t: usize) -> f64 {
        (0..t).map(|i| self.discount(i)).product()
    }

    fn actions(&self, state: &Self::State, t: usize) -> Result<Vec<Self::Action>>;

    fn reward(&self, state: &Self::State, action: &Self::Action, t: usize) -> f64;

    /// Successor distribution; entries with zero probability may be omitted.
    fn transitions(
        &self,
        state: &Self::State,
        action: &Self::Action,
        t: usize,
    ) -> Result<Vec<(Self::State, f64)>>;

    fn reward_table(&self, t: usize) -> RewardTable;

    /// Action followed by the current trial. Defaults to the greedy action
    /// of the upper bound.
    fn select_next_action(
        &self,
        lower: &mut Bound<Self>,
        upper: &mut Bound<Self>,
        state: &Self::State,
        t: usize,
    ) -> Result<Self::Action> {
        let _ = lower;
        upper.best_action(self, state, t)
    }

    /// Successor explored next. Defaults to the reachable successor with the
    /// largest probability-weighted gap at `t + 1`.
    fn next_state(
        &self,
        state: &Self::State,
        action: &Self::Action,
        t: usize,
        bounds: BoundPair<'_, Self>,
    ) -> Result<Self::State> {
        let mut best: Option<(Self::State, f64)> = None;
        for (next, probability) in self.transitions(state, action, t)? {
            if probability <= 0.0 {
                continue;
            }
            let score = probability * bounds.width(&next, t + 1);
            if best.as_ref().map_or(true, |(_, top)| score > *top) {
                best = Some((next, score));
            }
        }
        best.map(|(next, _)| next).ok_or_else(|| {
            SearchError::world(
                "next_state",
                format!("no reachable successor from {state:?} under {action:?} at stage {t}"),
            )
        })
    }

    /// How far the gap at `(state, t)` exceeds what the root tolerance
    /// allows at this depth. The trial descends while it is positive.
    fn excess(
        &self,
        incumbent: f64,
        lb: f64,
        ub: f64,
        cost_so_far: f64,
        error: f64,
        t: usize,
    ) -> f64 {
        let _ = (incumbent, cost_so_far);
        (ub - lb) - error / self.weighted_discount(t)
    }
}

/// Worlds whose optimal value is piecewise-linear and convex over the state
/// support, so that bounds can be carried as hyperplanes.
pub trait PwlcWorld: World {
    type Observation: Clone + Eq + Hash + Debug + 'static;

    /// Every point a hyperplane must be defined on at stage `t`.
    fn points(&self, t: usize) -> Vec<PointOf<Self>>;

    fn point_reward(&self, point: &PointOf<Self>, action: &Self::Action, t: usize) -> f64;

    /// Observations with positive probability after `action` in `state`.
    fn observations(
        &self,
        state: &Self::State,
        action: &Self::Action,
        t: usize,
    ) -> Result<Vec<(Self::Observation, f64)>>;

    /// Successor state once `observation` has been received.
    fn next_state_given(
        &self,
        state: &Self::State,
        action: &Self::Action,
        observation: &Self::Observation,
        t: usize,
    ) -> Result<Self::State>;

    /// `(next point, observation, probability)` triples from a single point.
    fn point_dynamics(
        &self,
        point: &PointOf<Self>,
        action: &Self::Action,
        t: usize,
    ) -> Result<Vec<(PointOf<Self>, Self::Observation, f64)>>;
}

/// Occupancy-MDP reformulation of a decentralized problem. States are
/// distributions over `(hidden state, joint history)` and actions are joint
/// decision rules built from one local rule per agent.
pub trait OccupancyWorld: World {
    type Hidden: Clone + Eq + Hash + Ord + Debug + 'static;
    type History: Clone + Eq + Hash + Ord + Debug + 'static;
    type LocalHistory: Clone + Eq + Hash + Ord + Debug + 'static;
    type JointAction: Clone + Eq + Hash + Ord + Debug + 'static;
    type LocalAction: Clone + Eq + Hash + Ord + Debug + 'static;
    type Observation: Clone + Eq + Hash + Debug + 'static;

    fn num_agents(&self) -> usize;

    /// Joint histories with positive mass in `state`.
    fn joint_histories(&self, state: &Self::State) -> Vec<Self::History>;

    /// `s(x, o)` for every hidden state with positive mass under `history`.
    fn occupancy(&self, state: &Self::State, history: &Self::History) -> Vec<(Self::Hidden, f64)>;

    fn joint_actions(&self, t: usize) -> Vec<Self::JointAction>;

    fn local_actions(&self, agent: usize, t: usize) -> Vec<Self::LocalAction>;

    fn local_action(&self, joint: &Self::JointAction, agent: usize) -> Self::LocalAction;

    fn local_history(&self, history: &Self::History, agent: usize) -> Self::LocalHistory;

    /// `p(x', z | x, u)`.
    fn dynamics(
        &self,
        hidden: &Self::Hidden,
        joint: &Self::JointAction,
        next_hidden: &Self::Hidden,
        observation: &Self::Observation,
        t: usize,
    ) -> f64;

    fn expand(&self, history: &Self::History, observation: &Self::Observation) -> Self::History;

    /// `None` for the empty history.
    fn last_observation(&self, history: &Self::History) -> Option<Self::Observation>;

    /// `(x', o', probability)` entries a stored witness constrains.
    fn successor_points(&self, witness: &Self::State) -> Vec<(Self::Hidden, Self::History, f64)> {
        self.joint_histories(witness)
            .into_iter()
            .flat_map(|history| {
                let entries = self.occupancy(witness, &history);
                entries
                    .into_iter()
                    .map(move |(hidden, p)| (hidden, history.clone(), p))
            })
            .collect()
    }

    fn hidden_reward(&self, hidden: &Self::Hidden, joint: &Self::JointAction, t: usize) -> f64;

    /// `sum_x s(x, o) * Q(x, u, t)` under the relaxation the upper bound was
    /// initialized with.
    fn relaxed_q(
        &self,
        state: &Self::State,
        history: &Self::History,
        joint: &Self::JointAction,
        t: usize,
    ) -> Result<f64>;

    /// Assemble a joint decision rule from one local rule per agent.
    fn decision_rule(
        &self,
        state: &Self::State,
        local_rules: Vec<Vec<(Self::LocalHistory, Self::LocalAction)>>,
        t: usize,
    ) -> Result<Self::Action>;
}
