//! CEM-RL: evolutionary search and actor-critic learning in pure Rust.
//!
//! Architecture:
//! - `env`, `pendulum`, `swimmer`: Environment trait + continuous-control tasks
//! - `policy`: flat-parameter MLP with forward and backward pass
//! - `ddpg`: Actor, Critic, Adam and the DDPG/TD3 `GradientLearner`
//! - `replay`, `noise`, `rollout`: experience, exploration and the Evaluator
//! - `optim`: separable CEM (ask/tell)
//! - `runner`: the training loop fusing both populations, plus test mode
//! - `config`, `storage`, `error`: run configuration, on-disk layout, typed errors

pub mod config;
pub mod ddpg;
pub mod env;
pub mod error;
pub mod noise;
pub mod optim;
pub mod pendulum;
pub mod policy;
pub mod replay;
pub mod rollout;
pub mod runner;
pub mod storage;
pub mod swimmer;
