//! HSVI trial engine.
//!
//! Each trial walks a single path from the root: at every depth the world
//! picks an action (by default greedy on the upper bound) and a successor
//! (by default the one with the largest weighted gap), until the gap at the
//! current node is within the tolerance allotted to its depth. Both bounds
//! are then backed up along the path on the way back. Trials repeat until the
//! root gap falls below `error`, the trial budget is spent or the wall-clock
//! budget runs out.
//!
//! ```
//! use hsvi_bounds::{BoundBuilder, Hsvi, Initializer};
//! use hsvi_bounds::config::HsviConfig;
//! use hsvi_bounds::models::mdp::TabularMdp;
//! use hsvi_bounds::traits::{Horizon, World};
//!
//! let mdp = TabularMdp::chain(4, Horizon::Finite(5), 0.95).unwrap();
//! let lower = BoundBuilder::lower().with_initializer(Initializer::MinReward).build(&mdp);
//! let upper = BoundBuilder::upper().with_initializer(Initializer::MaxReward).build(&mdp);
//! let config = HsviConfig { error: 1e-3, ..HsviConfig::default() };
//!
//! let mut hsvi = Hsvi::new(mdp, lower, upper, config).unwrap();
//! hsvi.initialize().unwrap();
//! let value = hsvi.solve().unwrap();
//! assert!(hsvi.upper().value_at(&hsvi.world().initial_state(), 0) - value <= 1e-3);
//! ```

use std::time::Instant;

use tracing::{debug_span, error, info};

use crate::bound::{Bound, Sense};
use crate::config::HsviConfig;
use crate::error::{Result, SearchError};
use crate::trial_log::{TrialLog, TrialRecord};
use crate::traits::{BoundPair, World};

/// Mutable bookkeeping of one search run: the trial counter, the clock and
/// the root the trials start from.
#[derive(Clone, Debug)]
pub struct SearchContext<S> {
    trial: usize,
    started: Option<Instant>,
    root: Option<S>,
}

impl<S> Default for SearchContext<S> {
    fn default() -> Self {
        Self {
            trial: 0,
            started: None,
            root: None,
        }
    }
}

impl<S> SearchContext<S> {
    pub fn trial(&self) -> usize {
        self.trial
    }

    pub fn root(&self) -> Option<&S> {
        self.root.as_ref()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.map_or(0.0, |start| start.elapsed().as_secs_f64())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Heuristic search value iteration over a [`World`] with a lower and an
/// upper [`Bound`].
///
/// The engine owns the world, both bounds and the trial log. Bounds are
/// mutated only from [`Hsvi::explore`], so after [`Hsvi::solve`] returns they
/// can be inspected through [`Hsvi::lower`] and [`Hsvi::upper`] or followed
/// with [`Hsvi::policy_rollout`].
pub struct Hsvi<W: World> {
    world: W,
    lower: Bound<W>,
    upper: Bound<W>,
    config: HsviConfig,
    context: SearchContext<W::State>,
    log: TrialLog,
}

impl<W: World> Hsvi<W> {
    /// Create an engine over `world`.
    ///
    /// Fails with [`SearchError::Config`] when `lower` is not a lower bound,
    /// `upper` is not an upper bound, or the two bounds were built for
    /// different horizons.
    pub fn new(world: W, lower: Bound<W>, upper: Bound<W>, config: HsviConfig) -> Result<Self> {
        if lower.sense() != Sense::Lower || upper.sense() != Sense::Upper {
            return Err(SearchError::Config(
                "HSVI needs a lower bound and an upper bound".to_string(),
            ));
        }
        if lower.horizon() != upper.horizon() {
            return Err(SearchError::Config(format!(
                "bounds disagree on the horizon: lower {:?}, upper {:?}",
                lower.horizon(),
                upper.horizon()
            )));
        }
        Ok(Self {
            world,
            lower,
            upper,
            config,
            context: SearchContext::default(),
            log: TrialLog::in_memory(),
        })
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn lower(&self) -> &Bound<W> {
        &self.lower
    }

    pub fn upper(&self) -> &Bound<W> {
        &self.upper
    }

    pub fn config(&self) -> &HsviConfig {
        &self.config
    }

    /// Number of completed trials.
    pub fn trial(&self) -> usize {
        self.context.trial
    }

    pub fn context(&self) -> &SearchContext<W::State> {
        &self.context
    }

    /// Rows recorded by the last [`Hsvi::solve`], one per trial plus a
    /// final one.
    pub fn records(&self) -> &[TrialRecord] {
        self.log.records()
    }

    /// Reset the search context and the trial log, then initialize both
    /// bounds.
    pub fn initialize(&mut self) -> Result<()> {
        self.context.reset();
        self.log = match &self.config.trial_log {
            Some(path) => TrialLog::to_csv(path)?,
            None => TrialLog::in_memory(),
        };
        self.lower.initialize(&self.world)?;
        self.upper.initialize(&self.world)?;
        Ok(())
    }

    /// Run trials from the world's initial state.
    ///
    /// Before each trial a row is appended to the trial log. The loop ends
    /// once [`Hsvi::stop`] holds at the root or the wall-clock budget in
    /// [`HsviConfig::time_max_secs`] is exceeded; a final row is recorded on
    /// exit. Returns the lower bound at the root.
    ///
    /// # Errors
    ///
    /// Any failure of a world callback, a backup or an action selection
    /// aborts the run and is returned after being logged.
    pub fn solve(&mut self) -> Result<f64> {
        let root = self.world.initial_state();
        self.context.root = Some(root.clone());
        self.context.trial = 0;
        self.context.started = Some(Instant::now());
        info!(
            name = %self.config.name,
            error = self.config.error,
            max_trials = self.config.max_trials,
            "starting HSVI"
        );

        loop {
            self.record(&root)?;
            let span = debug_span!("trial", trial = self.context.trial);
            let _enter = span.enter();
            if let Err(err) = self.explore(&root, 0.0, 0) {
                error!(trial = self.context.trial, operation = "explore", %err, "trial failed");
                return Err(err);
            }
            self.context.trial += 1;
            if self.stop(&root, 0.0, 0)? || self.out_of_time() {
                break;
            }
        }

        self.record(&root)?;
        self.log.flush()?;
        let value = self.result();
        info!(
            trials = self.context.trial,
            value,
            time = self.context.elapsed_secs(),
            "HSVI finished"
        );
        Ok(value)
    }

    /// One trial from `state` at `depth`.
    ///
    /// Returns immediately once [`Hsvi::stop`] holds. Otherwise the world
    /// picks an action and a successor from the current bounds, the trial
    /// recurses on that successor with the discounted reward added to
    /// `cost_so_far`, and both bounds are backed up at `(state, depth)` on
    /// the way out. Infinite-horizon bounds are also backed up before
    /// descending, since their single stage is shared by every depth.
    pub fn explore(&mut self, state: &W::State, cost_so_far: f64, depth: usize) -> Result<()> {
        if self.stop(state, cost_so_far, depth)? {
            return Ok(());
        }
        if self.lower.is_infinite_horizon() {
            self.lower.update_value_at(&self.world, state, depth)?;
            self.upper.update_value_at(&self.world, state, depth)?;
        }

        let action = self
            .world
            .select_next_action(&mut self.lower, &mut self.upper, state, depth)?;
        let next = self.world.next_state(
            state,
            &action,
            depth,
            BoundPair {
                lower: &self.lower,
                upper: &self.upper,
            },
        )?;
        let cost = cost_so_far + self.world.discount(depth) * self.world.reward(state, &action, depth);
        self.explore(&next, cost, depth + 1)?;

        self.lower.update_value_at(&self.world, state, depth)?;
        self.upper.update_value_at(&self.world, state, depth)?;
        Ok(())
    }

    /// Gap at `(state, depth)` that still exceeds the tolerance allotted to
    /// that depth, as computed by [`World::excess`] with the root lower bound
    /// as incumbent. Fails before [`Hsvi::solve`] has set a root.
    pub fn excess(&self, state: &W::State, cost_so_far: f64, depth: usize) -> Result<f64> {
        let root = self
            .context
            .root
            .as_ref()
            .ok_or_else(|| SearchError::world("excess", "search has no root yet"))?;
        let incumbent = self.lower.value_at(root, 0);
        Ok(self.world.excess(
            incumbent,
            self.lower.value_at(state, depth),
            self.upper.value_at(state, depth),
            cost_so_far,
            self.config.error,
            depth,
        ))
    }

    /// Whether a trial should not descend past `(state, depth)`: the excess
    /// is non-positive or the trial budget is spent.
    pub fn stop(&self, state: &W::State, cost_so_far: f64, depth: usize) -> Result<bool> {
        Ok(self.excess(state, cost_so_far, depth)? <= 0.0
            || self.context.trial >= self.config.max_trials)
    }

    /// Lower bound at the root. Before [`Hsvi::solve`] this reads the
    /// initial state.
    pub fn result(&self) -> f64 {
        match self.context.root.as_ref() {
            Some(root) => self.lower.value_at(root, 0),
            None => self.lower.value_at(&self.world.initial_state(), 0),
        }
    }

    /// Follow the lower bound's greedy actions from the root for at most
    /// `steps` epochs.
    pub fn policy_rollout(&mut self, steps: usize) -> Result<Vec<(W::State, W::Action)>> {
        let mut state = self.world.initial_state();
        let mut path = Vec::with_capacity(steps);
        for t in 0..steps {
            if self.lower.horizon().is_terminal(t) {
                break;
            }
            let action = self.lower.best_action(&self.world, &state, t)?;
            let next = self.world.next_state(
                &state,
                &action,
                t,
                BoundPair {
                    lower: &self.lower,
                    upper: &self.upper,
                },
            )?;
            path.push((state, action));
            state = next;
        }
        Ok(path)
    }

    fn out_of_time(&self) -> bool {
        self.config
            .time_max_secs
            .is_some_and(|limit| self.context.elapsed_secs() > limit)
    }

    fn record(&mut self, root: &W::State) -> Result<()> {
        let gap = self.excess(root, 0.0, 0)? + self.config.error;
        let record = TrialRecord {
            trial: self.context.trial,
            error: gap,
            value_lb: self.lower.value_at(root, 0),
            value_ub: self.upper.value_at(root, 0),
            size_lower_bound: self.lower.size(),
            size_upper_bound: self.upper.size(),
            time_secs: self.context.elapsed_secs(),
        };
        info!(
            trial = record.trial,
            error = record.error,
            value_lb = record.value_lb,
            value_ub = record.value_ub,
            size_lower_bound = record.size_lower_bound,
            size_upper_bound = record.size_upper_bound,
            time = record.time_secs,
            "trial"
        );
        self.log.append(record)
    }
}
