//! Inverted pendulum swing-up, gym's `Pendulum-v1` dynamics.
//!
//! Observation (3): [cos θ, sin θ, θ̇]
//! Action (1): torque in [-2, 2]
//! Reward: -(θ² + 0.1 θ̇² + 0.001 u²), θ normalised to [-π, π]
//! Never terminates; truncated after 200 steps.

use super::env::*;
use crate::error::EnvError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

const MAX_SPEED: f64 = 8.0;
const MAX_TORQUE: f64 = 2.0;
const DT: f64 = 0.05;
const GRAVITY: f64 = 10.0;
const MASS: f64 = 1.0;
const LENGTH: f64 = 1.0;
const MAX_STEPS: usize = 200;

pub struct Pendulum {
    config: EnvConfig,
    theta: f64,
    theta_dot: f64,
    step_count: usize,
    rng: StdRng,
}

impl Pendulum {
    pub fn new(seed: Option<u64>) -> Self {
        let config = EnvConfig {
            name: "Pendulum-v1".to_string(),
            obs_dim: 3,
            action_dim: 1,
            max_action: MAX_TORQUE,
            max_steps: MAX_STEPS,
        };
        let mut env = Pendulum {
            config,
            theta: 0.0,
            theta_dot: 0.0,
            step_count: 0,
            rng: StdRng::seed_from_u64(seed.unwrap_or(42)),
        };
        env.reset(None);
        env
    }

    fn get_obs(&self) -> Vec<f64> {
        vec![self.theta.cos(), self.theta.sin(), self.theta_dot]
    }
}

fn angle_normalize(x: f64) -> f64 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Environment for Pendulum {
    fn reset(&mut self, seed: Option<u64>) -> Vec<f64> {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }
        self.theta = self.rng.gen_range(-PI..PI);
        self.theta_dot = self.rng.gen_range(-1.0..1.0);
        self.step_count = 0;
        self.get_obs()
    }

    fn step(&mut self, action: &[f64]) -> Result<StepResult, EnvError> {
        self.config.check_action(action)?;
        let u = action[0].clamp(-MAX_TORQUE, MAX_TORQUE);

        let th = self.theta;
        let cost = angle_normalize(th).powi(2) + 0.1 * self.theta_dot.powi(2) + 0.001 * u * u;

        let acc = 3.0 * GRAVITY / (2.0 * LENGTH) * th.sin() + 3.0 / (MASS * LENGTH * LENGTH) * u;
        self.theta_dot = (self.theta_dot + acc * DT).clamp(-MAX_SPEED, MAX_SPEED);
        self.theta = th + self.theta_dot * DT;
        self.step_count += 1;

        Ok(StepResult {
            observation: self.get_obs(),
            reward: -cost,
            terminated: false,
            truncated: self.step_count >= MAX_STEPS,
        })
    }

    fn config(&self) -> &EnvConfig {
        &self.config
    }

    fn steps(&self) -> usize {
        self.step_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obs_on_unit_circle() {
        let mut env = Pendulum::new(Some(1));
        let obs = env.reset(Some(1));
        assert_eq!(obs.len(), 3);
        assert!((obs[0] * obs[0] + obs[1] * obs[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_truncates_at_horizon() {
        let mut env = Pendulum::new(Some(2));
        env.reset(None);
        for i in 1..=MAX_STEPS {
            let r = env.step(&[0.5]).unwrap();
            assert!(!r.terminated);
            assert_eq!(r.truncated, i == MAX_STEPS);
            assert!(r.reward <= 0.0);
        }
    }

    #[test]
    fn test_angle_normalize() {
        assert!((angle_normalize(2.0 * PI + 0.5) - 0.5).abs() < 1e-9);
        assert!((angle_normalize(-0.25) + 0.25).abs() < 1e-12);
        assert!((angle_normalize(0.5) - 0.5).abs() < 1e-12);
    }
}
