//! Run configuration.
//!
//! `TrainConfig` is assembled by the CLI, validated once, then handed to the
//! trainer. Its serialized form is the parameters manifest of a run.

use crate::ddpg::DdpgConfig;
use crate::error::ConfigError;
use crate::noise::NoiseConfig;
use crate::optim::CemConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub env: String,
    /// Gradient updates start once this many environment steps were taken.
    pub start_steps: usize,
    pub ddpg: DdpgConfig,
    /// Multiplier on rewards stored in the replay buffer.
    pub reward_scale: f64,
    /// Noise on the gradient actors' evaluation rollouts.
    pub grad_noise: NoiseConfig,
    /// Noise on the evolutionary candidates' rollouts.
    pub ea_noise: NoiseConfig,
    pub cem: CemConfig,
    pub pop_size: usize,
    pub n_grad: usize,
    pub n_episodes: usize,
    /// Global environment-step budget.
    pub max_steps: usize,
    pub mem_size: usize,
    /// Environment steps between checkpoints.
    pub period: usize,
    pub output: PathBuf,
    pub seed: Option<u64>,
    pub render: bool,
    pub parallel: bool,
    /// Actor checkpoint evaluated in test mode.
    pub filename: Option<PathBuf>,
    pub n_test: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            env: "Pendulum-v1".to_string(),
            start_steps: 10_000,
            ddpg: DdpgConfig::default(),
            reward_scale: 1.0,
            grad_noise: NoiseConfig::default(),
            ea_noise: NoiseConfig::default(),
            cem: CemConfig {
                sigma_init: 0.05,
                parents: 1,
                antithetic: true,
                ..CemConfig::default()
            },
            pop_size: 10,
            n_grad: 1,
            n_episodes: 1,
            max_steps: 1_000_000,
            mem_size: 1_000_000,
            period: 5000,
            output: PathBuf::from("results"),
            seed: None,
            render: false,
            parallel: false,
            filename: None,
            n_test: 1,
        }
    }
}

fn in_range(name: &'static str, range: &'static str, value: f64, ok: bool) -> Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, range, value })
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pop_size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        if self.cem.antithetic && self.pop_size % 2 != 0 {
            return Err(ConfigError::OddPopulation(self.pop_size));
        }
        // gradient actors join the selection pool once training is active
        let pool = self.pop_size + self.n_grad;
        if self.cem.parents == 0 || self.cem.parents > pool {
            return Err(ConfigError::Parents {
                parents: self.cem.parents,
                pool,
            });
        }

        for (name, value) in [
            ("n_episodes", self.n_episodes),
            ("period", self.period),
            ("mem_size", self.mem_size),
            ("batch_size", self.ddpg.batch_size),
            ("policy_freq", self.ddpg.policy_freq),
            ("n_test", self.n_test),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.ddpg.hidden.is_empty() || self.ddpg.hidden.contains(&0) {
            return Err(ConfigError::Hidden);
        }

        let d = &self.ddpg;
        in_range("discount", "[0, 1]", d.discount, (0.0..=1.0).contains(&d.discount))?;
        in_range("tau", "(0, 1]", d.tau, d.tau > 0.0 && d.tau <= 1.0)?;
        in_range("actor_lr", "(0, inf)", d.actor_lr, d.actor_lr > 0.0)?;
        in_range("critic_lr", "(0, inf)", d.critic_lr, d.critic_lr > 0.0)?;
        in_range("policy_noise", "[0, inf)", d.policy_noise, d.policy_noise >= 0.0)?;
        in_range("noise_clip", "[0, inf)", d.noise_clip, d.noise_clip >= 0.0)?;

        let c = &self.cem;
        in_range("sigma_init", "(0, inf)", c.sigma_init, c.sigma_init > 0.0)?;
        in_range("damp", "[0, inf)", c.damp, c.damp >= 0.0)?;
        in_range("damp_limit", "[0, inf)", c.damp_limit, c.damp_limit >= 0.0)?;
        in_range("damp_tau", "[0, 1]", c.damp_tau, (0.0..=1.0).contains(&c.damp_tau))?;
        in_range("reward_scale", "(-inf, inf)", self.reward_scale, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(TrainConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_odd_antithetic_population_rejected() {
        let cfg = TrainConfig { pop_size: 7, ..TrainConfig::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::OddPopulation(7)));

        let mut cfg = TrainConfig { pop_size: 7, ..TrainConfig::default() };
        cfg.cem.antithetic = false;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_parents_bounded_by_pool() {
        let mut cfg = TrainConfig::default();
        cfg.cem.parents = 12;
        assert_eq!(cfg.validate(), Err(ConfigError::Parents { parents: 12, pool: 11 }));
        cfg.cem.parents = 0;
        assert!(cfg.validate().is_err());
        cfg.cem.parents = 11;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_ranges() {
        let mut cfg = TrainConfig::default();
        cfg.ddpg.tau = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::OutOfRange { name: "tau", .. })));

        let mut cfg = TrainConfig::default();
        cfg.cem.sigma_init = f64::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigError::OutOfRange { name: "sigma_init", .. })));

        let mut cfg = TrainConfig::default();
        cfg.ddpg.hidden = vec![64, 0];
        assert_eq!(cfg.validate(), Err(ConfigError::Hidden));

        let cfg = TrainConfig { period: 0, ..TrainConfig::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("period")));
    }
}
