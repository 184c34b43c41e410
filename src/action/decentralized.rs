//! Rows tying a joint decision rule `a(u | o)` to one deterministic local
//! rule `a_i(u_i | o_i)` per agent:
//!
//! ```text
//! sum_u a(u | o) = 1                       for every joint history o
//! sum_{u_i} a_i(u_i | o_i) = 1             for every agent i and local history o_i
//! a(u | o) <= a_i(u_i | o_i)               for every o, u, i
//! a(u | o) >= sum_i a_i(u_i | o_i) - (n - 1)
//! ```

use std::collections::BTreeSet;

use crate::error::{Result, SearchError};
use crate::lp::{LinearProgram, LpSolution, Row, VarDomain};
use crate::naming::VarNaming;
use crate::traits::OccupancyWorld;

fn local_histories<W: OccupancyWorld>(
    world: &W,
    histories: &[W::History],
    agent: usize,
) -> BTreeSet<W::LocalHistory> {
    histories
        .iter()
        .map(|history| world.local_history(history, agent))
        .collect()
}

pub(crate) fn add_variables<W: OccupancyWorld>(
    world: &W,
    lp: &mut LinearProgram,
    histories: &[W::History],
    joint_actions: &[W::JointAction],
    t: usize,
) {
    for history in histories {
        for joint in joint_actions {
            lp.add_variable(
                VarNaming::joint_decision_name(joint, history),
                VarDomain::Continuous {
                    lower: 0.0,
                    upper: 1.0,
                },
            );
        }
    }
    for agent in 0..world.num_agents() {
        for local_history in local_histories(world, histories, agent) {
            for local in world.local_actions(agent, t) {
                lp.add_variable(
                    VarNaming::local_decision_name(&local, &local_history, agent),
                    VarDomain::Binary,
                );
            }
        }
    }
}

pub(crate) fn add_constraints<W: OccupancyWorld>(
    world: &W,
    lp: &mut LinearProgram,
    histories: &[W::History],
    joint_actions: &[W::JointAction],
    t: usize,
) -> Result<()> {
    let agents = world.num_agents();
    if agents == 0 {
        return Err(SearchError::world("decentralized constraints", "world has no agents"));
    }

    for history in histories {
        let terms = joint_actions
            .iter()
            .map(|joint| {
                lp.var(&VarNaming::joint_decision_name(joint, history))
                    .map(|var| (var, 1.0))
            })
            .collect::<Result<Vec<_>>>()?;
        lp.add_row(Row::Range {
            terms,
            lower: 1.0,
            upper: 1.0,
        });
    }

    for agent in 0..agents {
        let locals = world.local_actions(agent, t);
        for local_history in local_histories(world, histories, agent) {
            let terms = locals
                .iter()
                .map(|local| {
                    lp.var(&VarNaming::local_decision_name(local, &local_history, agent))
                        .map(|var| (var, 1.0))
                })
                .collect::<Result<Vec<_>>>()?;
            lp.add_row(Row::Range {
                terms,
                lower: 1.0,
                upper: 1.0,
            });
        }
    }

    for history in histories {
        for joint in joint_actions {
            let joint_var = lp.var(&VarNaming::joint_decision_name(joint, history))?;
            let mut linking = vec![(joint_var, 1.0)];
            for agent in 0..agents {
                let local_var = lp.var(&VarNaming::local_decision_name(
                    &world.local_action(joint, agent),
                    &world.local_history(history, agent),
                    agent,
                ))?;
                lp.add_row(Row::Range {
                    terms: vec![(joint_var, 1.0), (local_var, -1.0)],
                    lower: f64::NEG_INFINITY,
                    upper: 0.0,
                });
                linking.push((local_var, -1.0));
            }
            lp.add_row(Row::Range {
                terms: linking,
                lower: -((agents - 1) as f64),
                upper: f64::INFINITY,
            });
        }
    }
    Ok(())
}

/// Read the local rules off a solved program and let the world assemble
/// the joint decision rule.
pub(crate) fn extract_rule<W: OccupancyWorld>(
    world: &W,
    lp: &LinearProgram,
    solution: &LpSolution,
    state: &W::State,
    histories: &[W::History],
    t: usize,
) -> Result<W::Action> {
    let mut rules = Vec::with_capacity(world.num_agents());
    for agent in 0..world.num_agents() {
        let mut rule = Vec::new();
        for local_history in local_histories(world, histories, agent) {
            let mut best: Option<(W::LocalAction, f64)> = None;
            for local in world.local_actions(agent, t) {
                let var = lp.var(&VarNaming::local_decision_name(&local, &local_history, agent))?;
                let value = solution.value(var);
                if best.as_ref().map_or(true, |(_, top)| value > *top) {
                    best = Some((local, value));
                }
            }
            let (local, _) = best.ok_or(SearchError::EmptyActionSpace { stage: t })?;
            rule.push((local_history, local));
        }
        rules.push(rule);
    }
    world.decision_rule(state, rules, t)
}
