//! Separable Cross-Entropy Method over flat parameter vectors.
//!
//! The search distribution is a Gaussian with diagonal covariance. `ask`
//! samples candidates, `tell` refits mean and variance on the top `parents`
//! of whatever population it is handed, so externally trained vectors can be
//! merged into the selection pool alongside sampled ones.

use crate::error::EsError;
use crate::policy::ParameterVector;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How selected parents are weighted in the refit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// `w_i ∝ ln((k + 1) / i)` for rank `i` of `k` parents.
    Log,
    /// Plain average of the parents.
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CemConfig {
    /// Initial per-dimension variance.
    pub sigma_init: f64,
    /// Variance added at every update; decays towards `damp_limit`.
    pub damp: f64,
    pub damp_limit: f64,
    /// Decay rate of `damp`.
    pub damp_tau: f64,
    /// Number of top candidates kept for the refit.
    pub parents: usize,
    pub antithetic: bool,
    /// Reinsert the previous best candidate as the last sample of `ask`.
    pub elitism: bool,
    pub weighting: Weighting,
    /// Hard lower bound on every variance entry.
    pub min_variance: f64,
}

impl Default for CemConfig {
    fn default() -> Self {
        CemConfig {
            sigma_init: 1e-3,
            damp: 1e-3,
            damp_limit: 1e-5,
            damp_tau: 0.95,
            parents: 5,
            antithetic: false,
            elitism: false,
            weighting: Weighting::Log,
            min_variance: 1e-12,
        }
    }
}

/// Normalised recombination weights for `k` ranked parents.
pub fn recombination_weights(k: usize, weighting: Weighting) -> Vec<f64> {
    let raw: Vec<f64> = match weighting {
        Weighting::Log => (1..=k).map(|i| ((k as f64 + 1.0) / i as f64).ln()).collect(),
        Weighting::Uniform => vec![1.0; k],
    };
    let sum: f64 = raw.iter().sum();
    raw.iter().map(|w| w / sum).collect()
}

fn lexicographic(a: &[f64], b: &[f64]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Separable CEM search engine.
#[derive(Debug, Clone)]
pub struct SepCem {
    pub n: usize,
    config: CemConfig,
    mean: ParameterVector,
    variance: Vec<f64>,
    damp: f64,
    elite: Option<(ParameterVector, f64)>,
    pub gen: usize,
}

impl SepCem {
    /// Build an engine for dimension `n` starting at `mean_init` (zeros if `None`).
    ///
    /// `pop_size` is the size future `ask` calls will use; it is checked
    /// here so an odd antithetic population fails before any rollout.
    pub fn new(
        n: usize,
        mean_init: Option<ParameterVector>,
        pop_size: usize,
        config: CemConfig,
    ) -> Result<Self, EsError> {
        if pop_size == 0 {
            return Err(EsError::EmptyPopulation);
        }
        if config.antithetic && pop_size % 2 != 0 {
            return Err(EsError::OddPopulation(pop_size));
        }
        let mean = match mean_init {
            Some(m) if m.len() != n => {
                return Err(EsError::DimensionMismatch { expected: n, got: m.len() })
            }
            Some(m) => m,
            None => vec![0.0; n],
        };
        let variance = vec![config.sigma_init.max(config.min_variance); n];
        Ok(SepCem {
            n,
            damp: config.damp,
            config,
            mean,
            variance,
            elite: None,
            gen: 0,
        })
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn variance(&self) -> &[f64] {
        &self.variance
    }

    pub fn damp(&self) -> f64 {
        self.damp
    }

    /// Best candidate of the last `tell` and its fitness.
    pub fn elite(&self) -> Option<(&[f64], f64)> {
        self.elite.as_ref().map(|(x, f)| (x.as_slice(), *f))
    }

    /// Mean standard deviation across dimensions, for logging.
    pub fn mean_std(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.variance.iter().map(|v| v.sqrt()).sum::<f64>() / self.n as f64
    }

    /// Sample `pop_size` candidates.
    ///
    /// With antithetic sampling, candidates come in adjacent mirrored pairs
    /// `(mean + ε, mean - ε)`.
    pub fn ask(&self, pop_size: usize, rng: &mut impl Rng) -> Result<Vec<ParameterVector>, EsError> {
        if pop_size == 0 {
            return Err(EsError::EmptyPopulation);
        }
        if self.config.antithetic && pop_size % 2 != 0 {
            return Err(EsError::OddPopulation(pop_size));
        }

        let std: Vec<f64> = self.variance.iter().map(|v| v.sqrt()).collect();
        let draws = if self.config.antithetic { pop_size / 2 } else { pop_size };

        let mut pop = Vec::with_capacity(pop_size);
        for _ in 0..draws {
            let eps: Vec<f64> = std
                .iter()
                .map(|s| s * rng.sample::<f64, _>(StandardNormal))
                .collect();
            pop.push(self.mean.iter().zip(&eps).map(|(m, e)| m + e).collect());
            if self.config.antithetic {
                pop.push(self.mean.iter().zip(&eps).map(|(m, e)| m - e).collect());
            }
        }

        if self.config.elitism {
            if let (Some((elite, _)), Some(last)) = (&self.elite, pop.last_mut()) {
                *last = elite.clone();
            }
        }
        Ok(pop)
    }

    /// Refit the distribution on an evaluated population. Higher fitness is better.
    ///
    /// `params` need not come from `ask`; any vectors of length `n` are accepted.
    pub fn tell(&mut self, params: &[ParameterVector], fitnesses: &[f64]) -> Result<(), EsError> {
        if params.len() != fitnesses.len() {
            return Err(EsError::ShapeMismatch {
                params: params.len(),
                fitnesses: fitnesses.len(),
            });
        }
        if params.is_empty() {
            return Err(EsError::EmptyPopulation);
        }
        if let Some(bad) = params.iter().find(|p| p.len() != self.n) {
            return Err(EsError::DimensionMismatch {
                expected: self.n,
                got: bad.len(),
            });
        }

        // Best first; NaN ranks last. Equal fitness falls back to the vectors
        // themselves so the cut at `parents` does not depend on input order.
        let key = |i: usize| if fitnesses[i].is_nan() { f64::NEG_INFINITY } else { fitnesses[i] };
        let mut order: Vec<usize> = (0..params.len()).collect();
        order.sort_by(|&a, &b| {
            key(b)
                .total_cmp(&key(a))
                .then_with(|| lexicographic(&params[a], &params[b]))
        });

        let k = self.config.parents.clamp(1, params.len());
        let selected = &order[..k];
        let mut weights = recombination_weights(k, self.config.weighting);

        // Equal fitness shares one weight
        let mut start = 0;
        while start < k {
            let mut end = start + 1;
            while end < k && key(selected[end]) == key(selected[start]) {
                end += 1;
            }
            if end - start > 1 {
                let shared = weights[start..end].iter().sum::<f64>() / (end - start) as f64;
                weights[start..end].iter_mut().for_each(|w| *w = shared);
            }
            start = end;
        }

        self.damp = self.config.damp_tau * self.damp + (1.0 - self.config.damp_tau) * self.config.damp_limit;

        for j in 0..self.n {
            let mean_j: f64 = selected.iter().zip(&weights).map(|(&i, w)| w * params[i][j]).sum();
            let var_j: f64 = selected
                .iter()
                .zip(&weights)
                .map(|(&i, w)| w * (params[i][j] - mean_j).powi(2))
                .sum();
            self.mean[j] = mean_j;
            self.variance[j] = (var_j + self.damp).max(self.config.min_variance);
        }

        let best = order[0];
        self.elite = Some((params[best].clone(), fitnesses[best]));
        self.gen += 1;
        Ok(())
    }
}
