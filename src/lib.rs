//! Heuristic Search Value Iteration (HSVI) with pluggable value bounds.
//!
//! This crate provides a generic trial-based search engine for sequential
//! decision processes whose optimal value is approached from both sides by a
//! lower and an upper bound, following the HSVI family of algorithms.
//!
//! ## Core idea
//! 1. Describe your process by implementing [`World`] (and [`PwlcWorld`] or
//!    [`OccupancyWorld`] when its value function is convex over beliefs, or
//!    it is an occupancy-MDP reformulation of a decentralized problem).
//! 2. Assemble a lower and an upper [`Bound`] with [`BoundBuilder`], picking
//!    a representation, an initializer, a backup and an action selection.
//! 3. Let [`Hsvi`] run trials from the initial state until the bounds meet
//!    within the configured error at the root.
//!
//! ## Quick start
//! ```
//! use hsvi_bounds::{BoundBuilder, Hsvi, HsviConfig, Initializer};
//! use hsvi_bounds::models::TabularPomdp;
//! use hsvi_bounds::traits::Horizon;
//!
//! let tiger = TabularPomdp::tiger(Horizon::Finite(2), 1.0).unwrap();
//! let relaxation = tiger.underlying_mdp().unwrap().optimal_values().unwrap();
//! let lower = BoundBuilder::lower()
//!     .max_plan()
//!     .with_initializer(Initializer::MinReward)
//!     .build(&tiger);
//! let upper = BoundBuilder::upper()
//!     .point_set()
//!     .with_initializer(Initializer::relaxation(relaxation))
//!     .build(&tiger);
//!
//! let mut hsvi = Hsvi::new(tiger, lower, upper, HsviConfig::default()).unwrap();
//! hsvi.initialize().unwrap();
//! let value = hsvi.solve().unwrap();
//! assert!((value - -2.0).abs() < 1e-2);
//! ```
//!
//! ## Built-in worlds
//! The `models` module contains:
//! - tabular MDPs, also used as relaxations of the partially observable ones
//! - POMDPs searched over beliefs, with the tiger problem
//! - Dec-POMDPs searched over occupancy states, with the decentralized tiger

pub mod action;
pub mod backup;
pub mod bound;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod initializer;
pub mod lp;
pub mod models;
pub mod naming;
pub mod traits;
pub mod trial_log;

pub use crate::action::{ActionSelection, Exhaustive, SawtoothLp};
pub use crate::backup::{BackupOperator, BackupValue, MaxPlanBackup, TabularBackup};
pub use crate::bound::{Bound, Envelope, RepresentationKind, Sense};
pub use crate::builder::BoundBuilder;
pub use crate::config::{HsviConfig, SawtoothConfig, SolverConfig};
pub use crate::engine::Hsvi;
pub use crate::error::{Result, SearchError};
pub use crate::initializer::Initializer;
pub use crate::traits::{Horizon, OccupancyWorld, PwlcWorld, SearchState, World};
