//! Environment abstraction for continuous control.
//!
//! Mirrors gym's API but in pure Rust. Each environment declares its
//! observation size, action size and symmetric action bound, plus the
//! episode step limit that separates truncation from true termination.

use crate::error::EnvError;
use std::fmt;

/// Result of a step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Vec<f64>,
    pub reward: f64,
    /// The episode reached a terminal state.
    pub terminated: bool,
    /// The episode hit the step limit.
    pub truncated: bool,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Static description of an environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    pub name: String,
    pub obs_dim: usize,
    pub action_dim: usize,
    /// Actions live in `[-max_action, max_action]` on every dimension.
    pub max_action: f64,
    /// Episode length after which the environment truncates.
    pub max_steps: usize,
}

impl EnvConfig {
    /// Validate an action against this environment's action space.
    pub fn check_action(&self, action: &[f64]) -> Result<(), EnvError> {
        if action.len() != self.action_dim {
            return Err(EnvError::ActionDimension {
                expected: self.action_dim,
                got: action.len(),
            });
        }
        if action.iter().any(|a| !a.is_finite()) {
            return Err(EnvError::NonFinite);
        }
        Ok(())
    }

    /// Clip an action into the environment's bounds.
    pub fn clip(&self, action: &mut [f64]) {
        for a in action {
            *a = a.clamp(-self.max_action, self.max_action);
        }
    }
}

/// The core Environment trait.
///
/// Environments are plain data so they are `Send`; parallel evaluation
/// builds one instance per candidate.
pub trait Environment: Send {
    /// Reset to an initial state. `Some(seed)` reseeds the internal generator.
    fn reset(&mut self, seed: Option<u64>) -> Vec<f64>;

    /// Apply an action. Invalid actions are an error, not a clamp.
    fn step(&mut self, action: &[f64]) -> Result<StepResult, EnvError>;

    fn config(&self) -> &EnvConfig;

    /// Steps taken in the current episode.
    fn steps(&self) -> usize;
}

/// Factory: create an environment by name.
pub fn make(name: &str, seed: Option<u64>) -> Result<Box<dyn Environment>, EnvError> {
    match name {
        "Pendulum-v1" => Ok(Box::new(super::pendulum::Pendulum::new(seed))),
        "Swimmer-v1" => Ok(Box::new(super::swimmer::Swimmer::new(seed))),
        "CartPoleContinuous-v1" => Ok(Box::new(cartpole::CartPole::new(seed))),
        _ => Err(EnvError::UnknownEnv(name.to_string())),
    }
}

// ─── Continuous CartPole ──────────────────────────────────────────────

pub mod cartpole {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const GRAVITY: f64 = 9.8;
    const CART_MASS: f64 = 1.0;
    const POLE_MASS: f64 = 0.1;
    const TOTAL_MASS: f64 = CART_MASS + POLE_MASS;
    const POLE_HALF_LENGTH: f64 = 0.5;
    const FORCE_MAG: f64 = 10.0;
    const TAU: f64 = 0.02; // timestep
    const X_THRESHOLD: f64 = 2.4;
    const THETA_THRESHOLD: f64 = 12.0 * std::f64::consts::PI / 180.0;

    /// Cart-pole balancing with a continuous force in `[-1, 1]`.
    /// Terminates when the pole falls or the cart leaves the track.
    pub struct CartPole {
        config: EnvConfig,
        state: [f64; 4], // x, x_dot, theta, theta_dot
        step_count: usize,
        rng: StdRng,
    }

    impl CartPole {
        pub fn new(seed: Option<u64>) -> Self {
            let config = EnvConfig {
                name: "CartPoleContinuous-v1".to_string(),
                obs_dim: 4,
                action_dim: 1,
                max_action: 1.0,
                max_steps: 500,
            };
            let mut env = CartPole {
                config,
                state: [0.0; 4],
                step_count: 0,
                rng: StdRng::seed_from_u64(seed.unwrap_or(42)),
            };
            env.reset(None);
            env
        }

        /// Place the cart at an explicit state. Used by tests.
        pub fn set_state(&mut self, state: [f64; 4]) {
            self.state = state;
        }
    }

    impl Environment for CartPole {
        fn reset(&mut self, seed: Option<u64>) -> Vec<f64> {
            if let Some(s) = seed {
                self.rng = StdRng::seed_from_u64(s);
            }
            for v in self.state.iter_mut() {
                *v = self.rng.gen_range(-0.05..0.05);
            }
            self.step_count = 0;
            self.state.to_vec()
        }

        fn step(&mut self, action: &[f64]) -> Result<StepResult, EnvError> {
            self.config.check_action(action)?;
            let force = action[0].clamp(-1.0, 1.0) * FORCE_MAG;

            let [x, x_dot, theta, theta_dot] = self.state;
            let cos_theta = theta.cos();
            let sin_theta = theta.sin();

            let temp = (force + POLE_MASS * POLE_HALF_LENGTH * theta_dot * theta_dot * sin_theta)
                / TOTAL_MASS;
            let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
                / (POLE_HALF_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / TOTAL_MASS));
            let x_acc = temp - POLE_MASS * POLE_HALF_LENGTH * theta_acc * cos_theta / TOTAL_MASS;

            // Euler integration
            self.state = [
                x + TAU * x_dot,
                x_dot + TAU * x_acc,
                theta + TAU * theta_dot,
                theta_dot + TAU * theta_acc,
            ];
            self.step_count += 1;

            let terminated =
                self.state[0].abs() > X_THRESHOLD || self.state[2].abs() > THETA_THRESHOLD;
            let truncated = self.step_count >= self.config.max_steps;

            Ok(StepResult {
                observation: self.state.to_vec(),
                reward: if terminated { 0.0 } else { 1.0 },
                terminated,
                truncated,
            })
        }

        fn config(&self) -> &EnvConfig {
            &self.config
        }

        fn steps(&self) -> usize {
            self.step_count
        }
    }
}

impl fmt::Display for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (obs={}, act={}, bound=±{}, horizon={})",
            self.name, self.obs_dim, self.action_dim, self.max_action, self.max_steps
        )
    }
}
