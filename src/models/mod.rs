//! Ready-made worlds: tabular MDPs, POMDPs over beliefs and Dec-POMDPs over
//! occupancy states, with the classic tiger benchmarks.

pub mod decpomdp;
pub mod mdp;
pub mod pomdp;

pub use decpomdp::{DecPomdp, JointDecisionRule, OccupancyMdp, OccupancyState};
pub use mdp::{MdpState, MdpValues, TabularMdp};
pub use pomdp::{Belief, TabularPomdp};
