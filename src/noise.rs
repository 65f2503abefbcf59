//! Exploration noise added to deterministic actions.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// A stateful noise process producing one perturbation per step.
pub trait ActionNoise: Send {
    fn sample(&mut self, rng: &mut dyn rand::RngCore) -> Vec<f64>;

    /// Called at the start of every episode.
    fn reset(&mut self) {}
}

/// Independent N(0, σ²) on every action dimension.
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    action_dim: usize,
    sigma: f64,
}

impl GaussianNoise {
    pub fn new(action_dim: usize, sigma: f64) -> Self {
        GaussianNoise { action_dim, sigma }
    }
}

impl ActionNoise for GaussianNoise {
    fn sample(&mut self, rng: &mut dyn rand::RngCore) -> Vec<f64> {
        (0..self.action_dim)
            .map(|_| self.sigma * rng.sample::<f64, _>(StandardNormal))
            .collect()
    }
}

/// Ornstein-Uhlenbeck process: `x += θ(μ - x) + σ N(0, 1)`.
#[derive(Debug, Clone)]
pub struct OrnsteinUhlenbeck {
    theta: f64,
    sigma: f64,
    mu: f64,
    state: Vec<f64>,
}

impl OrnsteinUhlenbeck {
    pub fn new(action_dim: usize, theta: f64, sigma: f64, mu: f64) -> Self {
        OrnsteinUhlenbeck {
            theta,
            sigma,
            mu,
            state: vec![mu; action_dim],
        }
    }
}

impl ActionNoise for OrnsteinUhlenbeck {
    fn sample(&mut self, rng: &mut dyn rand::RngCore) -> Vec<f64> {
        for x in self.state.iter_mut() {
            let dx = self.theta * (self.mu - *x) + self.sigma * rng.sample::<f64, _>(StandardNormal);
            *x += dx;
        }
        self.state.clone()
    }

    fn reset(&mut self) {
        self.state.iter_mut().for_each(|x| *x = self.mu);
    }
}

/// Which noise process a group of rollouts uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NoiseKind {
    /// Greedy rollouts.
    None,
    Gaussian,
    Ou,
}

/// Parameters of every noise process, plus the selected kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub kind: NoiseKind,
    pub gauss_sigma: f64,
    pub ou_theta: f64,
    pub ou_sigma: f64,
    pub ou_mu: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            kind: NoiseKind::None,
            gauss_sigma: 0.1,
            ou_theta: 0.15,
            ou_sigma: 0.2,
            ou_mu: 0.0,
        }
    }
}

impl NoiseConfig {
    pub fn build(&self, action_dim: usize) -> Option<Box<dyn ActionNoise>> {
        match self.kind {
            NoiseKind::None => None,
            NoiseKind::Gaussian => Some(Box::new(GaussianNoise::new(action_dim, self.gauss_sigma))),
            NoiseKind::Ou => Some(Box::new(OrnsteinUhlenbeck::new(
                action_dim,
                self.ou_theta,
                self.ou_sigma,
                self.ou_mu,
            ))),
        }
    }
}
