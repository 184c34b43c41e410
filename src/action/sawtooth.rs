//! Greedy decision rules against a sawtooth upper bound, found by a
//! mixed-integer program.
//!
//! For an occupancy state `s` at `t` the program chooses a joint decision
//! rule `a` maximizing
//!
//! ```text
//! sum_{o,u} a(u | o) Q0(o, u) + discount(t) * v0
//! ```
//!
//! where `Q0` is the one-step value against the initial upper bound and
//! `v0 <= 0` is the sawtooth correction of the successor `s' = T(s, a)`.
//! For every witness `k` stored at `t + 1`, one binary `omega_k(x', o')` per
//! successor point picks the point realizing `min_x s'(x) / s_k(x)`, and
//!
//! ```text
//! v0 <= (v_k - V0(s_k)) * s'(x', o') / s_k(x', o')
//! ```
//!
//! is enforced for the picked point, with `s'(x', o')` linear in `a`.

use std::collections::HashMap;

use tracing::debug;

use crate::action::{decentralized, ActionSelection};
use crate::bound::{Envelope, InitialValue, Sense, Witness};
use crate::config::{SawtoothConfig, SawtoothEncoding, SawtoothMode};
use crate::error::{Result, SearchError};
use crate::lp::{Direction, LinearProgram, LpSolver, MicroLp, Row, VarDomain};
use crate::naming::VarNaming;
use crate::traits::OccupancyWorld;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Encoding {
    BigM(f64),
    Indicator,
}

/// A built program plus the constant its objective omits.
#[derive(Clone, Debug)]
pub struct SawtoothProgram {
    pub program: LinearProgram,
    pub offset: f64,
}

/// Sawtooth action selection for upper bounds over occupancy states.
///
/// In [`SawtoothMode::Full`] a single program covers every witness stored
/// at `t + 1`. In [`SawtoothMode::Relaxed`] one program is solved per
/// witness and the smallest value wins; if that value is above the bound
/// at the state, the rule returned last time for the same state is played
/// again at the bound's current value. The relaxed answer is an
/// approximation and does not by itself keep the upper bound sound.
pub struct SawtoothLp<W: OccupancyWorld, L: LpSolver = MicroLp> {
    config: SawtoothConfig,
    solver: L,
    last_rules: HashMap<W::State, W::Action>,
}

impl<W: OccupancyWorld> SawtoothLp<W> {
    /// Selection backed by the bundled [`MicroLp`] solver.
    pub fn new(config: SawtoothConfig) -> Self {
        Self::with_solver(config, MicroLp)
    }
}

impl<W: OccupancyWorld, L: LpSolver> SawtoothLp<W, L> {
    /// Selection backed by any [`LpSolver`].
    pub fn with_solver(config: SawtoothConfig, solver: L) -> Self {
        Self {
            config,
            solver,
            last_rules: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SawtoothConfig {
        &self.config
    }

    /// Decision rule last returned for `state`.
    pub fn cached_rule(&self, state: &W::State) -> Option<&W::Action> {
        self.last_rules.get(state)
    }

    /// Program of the full mode over `witnesses`, with the configured
    /// encoding.
    pub fn build_program(
        &self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        t: usize,
        witnesses: &[Witness<W::State>],
    ) -> Result<SawtoothProgram> {
        build(world, envelope, state, t, witnesses, self.full_encoding())
    }

    fn full_encoding(&self) -> Encoding {
        match self.config.encoding {
            SawtoothEncoding::BigM => Encoding::BigM(self.config.big_m),
            SawtoothEncoding::Indicator => Encoding::Indicator,
        }
    }

    fn solve(
        &self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        t: usize,
        witnesses: &[Witness<W::State>],
        encoding: Encoding,
    ) -> Result<(W::Action, f64)> {
        let SawtoothProgram { program, offset } =
            build(world, envelope, state, t, witnesses, encoding)?;
        debug!(
            t,
            witnesses = witnesses.len(),
            variables = program.num_variables(),
            rows = program.rows().len(),
            "sawtooth program built"
        );
        let solution = self.solver.solve(&program)?;
        let histories = world.joint_histories(state);
        let rule = decentralized::extract_rule(world, &program, &solution, state, &histories, t)?;
        Ok((rule, solution.objective() + offset))
    }

    /// One program per witness with every sawtooth row active; the smallest
    /// objective wins. When that exceeds the current bound the rule cached
    /// for the state is reused.
    fn relaxed(
        &self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        t: usize,
        witnesses: &[Witness<W::State>],
    ) -> Result<(W::Action, f64)> {
        if witnesses.is_empty() {
            return self.solve(world, envelope, state, t, &[], Encoding::BigM(0.0));
        }
        let mut best: Option<(W::Action, f64)> = None;
        for witness in witnesses {
            let candidate = self.solve(
                world,
                envelope,
                state,
                t,
                std::slice::from_ref(witness),
                Encoding::BigM(0.0),
            )?;
            if best.as_ref().map_or(true, |(_, top)| candidate.1 < *top) {
                best = Some(candidate);
            }
        }
        let (action, value) = best.ok_or(SearchError::EmptyActionSpace { stage: t })?;
        let current = envelope.value_at(state, t);
        if value > current {
            if let Some(previous) = self.last_rules.get(state) {
                debug!(t, value, current, "relaxed program above the bound, reusing cached rule");
                return Ok((previous.clone(), current));
            }
        }
        Ok((action, value))
    }
}

impl<W: OccupancyWorld, L: LpSolver> ActionSelection<W> for SawtoothLp<W, L> {
    /// Solves the configured program and caches the returned rule for
    /// `state`. Lower bounds are rejected with
    /// [`SearchError::NotImplemented`]; solver failures surface as
    /// [`SearchError::Solver`].
    fn select(
        &mut self,
        world: &W,
        envelope: &Envelope<W::State>,
        state: &W::State,
        t: usize,
    ) -> Result<(W::Action, f64)> {
        if envelope.sense() != Sense::Upper {
            return Err(SearchError::NotImplemented(
                "sawtooth action selection for a lower bound",
            ));
        }
        let witnesses = envelope.witnesses(t + 1);
        let (action, value) = match self.config.mode {
            SawtoothMode::Full => {
                self.solve(world, envelope, state, t, witnesses, self.full_encoding())?
            }
            SawtoothMode::Relaxed => self.relaxed(world, envelope, state, t, witnesses)?,
        };
        self.last_rules.insert(state.clone(), action.clone());
        Ok((action, value))
    }
}

/// Objective coefficient of `a(u | o)`.
fn objective<W: OccupancyWorld>(
    world: &W,
    envelope: &Envelope<W::State>,
    state: &W::State,
    history: &W::History,
    joint: &W::JointAction,
    t: usize,
) -> Result<f64> {
    match envelope.initial() {
        InitialValue::Function(_) => world.relaxed_q(state, history, joint, t),
        InitialValue::Stages(_) => Ok(world
            .occupancy(state, history)
            .iter()
            .map(|(hidden, mass)| mass * world.hidden_reward(hidden, joint, t))
            .sum()),
    }
}

fn objective_offset<W: OccupancyWorld>(world: &W, envelope: &Envelope<W::State>, t: usize) -> f64 {
    let next = t + 1;
    match envelope.initial() {
        InitialValue::Stages(values) if !envelope.horizon().is_terminal(next) => {
            let stage = envelope.horizon().stage(next);
            world.discount(t) * values.get(stage).copied().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

fn build<W: OccupancyWorld>(
    world: &W,
    envelope: &Envelope<W::State>,
    state: &W::State,
    t: usize,
    witnesses: &[Witness<W::State>],
    encoding: Encoding,
) -> Result<SawtoothProgram> {
    let mut lp = LinearProgram::new(Direction::Maximize);
    let v0 = lp.add_variable(
        VarNaming::weight_name(0),
        VarDomain::Continuous {
            lower: f64::NEG_INFINITY,
            upper: 0.0,
        },
    );

    let successors: Vec<Vec<(W::Hidden, W::History, f64)>> = witnesses
        .iter()
        .map(|witness| world.successor_points(&witness.state))
        .collect();
    for (k, points) in successors.iter().enumerate() {
        for (hidden, history, _) in points {
            lp.add_variable(
                VarNaming::responsibility_name(k, hidden, history),
                VarDomain::Binary,
            );
        }
    }

    let histories = world.joint_histories(state);
    let joint_actions = world.joint_actions(t);
    decentralized::add_variables(world, &mut lp, &histories, &joint_actions, t);

    lp.add_objective(v0, world.discount(t));
    for history in &histories {
        for joint in &joint_actions {
            let var = lp.var(&VarNaming::joint_decision_name(joint, history))?;
            let coefficient = objective(world, envelope, state, history, joint, t)?;
            lp.add_objective(var, coefficient);
        }
    }

    let occupancy: HashMap<&W::History, Vec<(W::Hidden, f64)>> = histories
        .iter()
        .map(|history| (history, world.occupancy(state, history)))
        .collect();

    for (k, (witness, points)) in witnesses.iter().zip(&successors).enumerate() {
        let difference = witness.value - witness.initial;
        let mut pick_one = Vec::with_capacity(points.len());
        for (next_hidden, next_history, probability) in points {
            let omega = lp.var(&VarNaming::responsibility_name(k, next_hidden, next_history))?;
            pick_one.push((omega, 1.0));
            if *probability <= 0.0 {
                continue;
            }
            let Some(observation) = world.last_observation(next_history) else {
                continue;
            };
            for history in histories
                .iter()
                .filter(|history| world.expand(history, &observation) == *next_history)
            {
                let mut terms = vec![(v0, 1.0)];
                for joint in &joint_actions {
                    let reach: f64 = occupancy[history]
                        .iter()
                        .map(|(hidden, mass)| {
                            mass * world.dynamics(hidden, joint, next_hidden, &observation, t)
                        })
                        .sum();
                    let coefficient = difference * reach / probability;
                    if coefficient != 0.0 {
                        let var = lp.var(&VarNaming::joint_decision_name(joint, history))?;
                        terms.push((var, -coefficient));
                    }
                }
                match encoding {
                    Encoding::BigM(big_m) => {
                        terms.push((omega, big_m));
                        lp.add_row(Row::Range {
                            terms,
                            lower: f64::NEG_INFINITY,
                            upper: big_m,
                        });
                    }
                    Encoding::Indicator => lp.add_row(Row::Implication {
                        indicator: omega,
                        terms,
                        upper: 0.0,
                    }),
                }
            }
        }
        if !pick_one.is_empty() {
            lp.add_row(Row::Range {
                terms: pick_one,
                lower: 1.0,
                upper: 1.0,
            });
        }
    }

    decentralized::add_constraints(world, &mut lp, &histories, &joint_actions, t)?;
    Ok(SawtoothProgram {
        offset: objective_offset(world, envelope, t),
        program: lp,
    })
}
