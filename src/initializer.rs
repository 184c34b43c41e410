//! Initial values for bounds.
//!
//! Reward-based initializers assume the worst (or best) immediate reward at
//! every remaining epoch; the relaxation initializer reuses the value
//! function of an easier problem, e.g. the fully observable MDP underlying a
//! POMDP, which upper-bounds the partially observable problem.

use std::fmt;
use std::rc::Rc;

use crate::bound::{InitialValue, Relaxation, Sense};
use crate::config::INFINITE_HORIZON_TOLERANCE;
use crate::error::{Result, SearchError};
use crate::traits::{Horizon, World};

pub enum Initializer<S> {
    /// The same value at every non-terminal stage.
    Constant(f64),
    /// Smallest reward collected at every remaining epoch.
    MinReward,
    /// Largest reward collected at every remaining epoch.
    MaxReward,
    /// Best single action played blindly, `min_t max_a min_s r(s, a, t)`.
    Blind,
    Relaxation(Rc<dyn Relaxation<S>>),
}

impl<S> Initializer<S> {
    pub fn relaxation(relaxation: impl Relaxation<S> + 'static) -> Self {
        Initializer::Relaxation(Rc::new(relaxation))
    }

    pub fn initial_value<W>(&self, world: &W, horizon: Horizon, sense: Sense) -> Result<InitialValue<S>>
    where
        W: World<State = S>,
    {
        let stages = match self {
            Initializer::Constant(value) => {
                let mut values = vec![*value; horizon.num_stages()];
                if let Horizon::Finite(h) = horizon {
                    values[h] = 0.0;
                }
                values
            }
            Initializer::MinReward => accumulate(world, horizon, sense, |t| world.reward_table(t).min())?,
            Initializer::MaxReward => accumulate(world, horizon, sense, |t| world.reward_table(t).max())?,
            Initializer::Blind => {
                let decision_epochs = match horizon {
                    Horizon::Finite(h) => h,
                    Horizon::Infinite => 1,
                };
                let blind = (0..decision_epochs)
                    .map(|t| world.reward_table(t).blind())
                    .fold(f64::INFINITY, f64::min);
                let blind = if blind.is_finite() { blind } else { 0.0 };
                accumulate(world, horizon, sense, |_| blind)?
            }
            Initializer::Relaxation(relaxation) => {
                return Ok(InitialValue::Function(Rc::clone(relaxation)))
            }
        };
        Ok(InitialValue::Stages(stages))
    }
}

/// `value[t] = reward(t) + discount(t + 1) * value[t + 1]` with
/// `value[H] = 0`, or the discounted fixpoint for infinite horizons.
fn accumulate<W, F>(world: &W, horizon: Horizon, sense: Sense, reward: F) -> Result<Vec<f64>>
where
    W: World,
    F: Fn(usize) -> f64,
{
    match horizon {
        Horizon::Finite(h) => {
            let mut values = vec![0.0; h + 1];
            for t in (0..h).rev() {
                values[t] = reward(t) + world.discount(t + 1) * values[t + 1];
            }
            Ok(values)
        }
        Horizon::Infinite => {
            let mut value = reward(0);
            let mut factor = 1.0;
            let mut t = 0;
            loop {
                let discount = world.discount(t);
                if !(0.0..1.0).contains(&discount) {
                    return Err(SearchError::Config(format!(
                        "infinite horizon needs a discount in [0, 1), got {discount} at epoch {t}"
                    )));
                }
                factor *= discount;
                t += 1;
                value += factor * reward(t);
                if factor < INFINITE_HORIZON_TOLERANCE {
                    break;
                }
            }
            // The truncated tail is absorbed by rounding outward.
            let rounded = match sense {
                Sense::Upper => value.ceil(),
                Sense::Lower => value.floor(),
            };
            Ok(vec![rounded])
        }
    }
}

impl<S> Clone for Initializer<S> {
    fn clone(&self) -> Self {
        match self {
            Initializer::Constant(v) => Initializer::Constant(*v),
            Initializer::MinReward => Initializer::MinReward,
            Initializer::MaxReward => Initializer::MaxReward,
            Initializer::Blind => Initializer::Blind,
            Initializer::Relaxation(r) => Initializer::Relaxation(Rc::clone(r)),
        }
    }
}

impl<S> fmt::Debug for Initializer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initializer::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Initializer::MinReward => f.write_str("MinReward"),
            Initializer::MaxReward => f.write_str("MaxReward"),
            Initializer::Blind => f.write_str("Blind"),
            Initializer::Relaxation(_) => f.write_str("Relaxation(..)"),
        }
    }
}
