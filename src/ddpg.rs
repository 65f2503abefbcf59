//! Actor-critic learners (DDPG, optionally TD3) in pure Rust.
//!
//! Manual forward + backward passes over `Mlp`, Adam on the flat parameter
//! vectors, Polyak-averaged target networks. One critic (two under TD3) is
//! shared by all gradient-tracked actors.

use crate::error::TrainError;
use crate::policy::{soft_update, Activation, Mlp, ParameterVector, Parameterized, Policy};
use crate::replay::ReplayBuffer;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

// ─── Adam Optimizer ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    t: usize,
}

impl Adam {
    pub fn new(n_params: usize, lr: f64) -> Self {
        Adam {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            m: vec![0.0; n_params],
            v: vec![0.0; n_params],
            t: 0,
        }
    }

    /// Bias-corrected update for each gradient entry.
    pub fn step(&mut self, grads: &[f64]) -> Vec<f64> {
        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        let mut updates = vec![0.0; grads.len()];
        for i in 0..grads.len() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * grads[i];
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * grads[i] * grads[i];
            let m_hat = self.m[i] / bias_correction1;
            let v_hat = self.v[i] / bias_correction2;
            updates[i] = self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
        updates
    }

    /// Gradient descent step on `params`.
    pub fn apply(&mut self, params: &mut [f64], grads: &[f64]) {
        for (p, u) in params.iter_mut().zip(self.step(grads)) {
            *p -= u;
        }
    }
}

// ─── Networks ───────────────────────────────────────────────────────

/// Deterministic policy: `max_action * tanh(MLP(state))`, ReLU hidden layers.
#[derive(Debug, Clone)]
pub struct Actor {
    net: Mlp,
    max_action: f64,
}

impl Actor {
    pub fn new(obs_dim: usize, action_dim: usize, max_action: f64, hidden: &[usize], rng: &mut impl Rng) -> Self {
        Actor {
            net: Mlp::new(obs_dim, action_dim, hidden, Activation::Relu, Activation::Tanh, rng),
            max_action,
        }
    }

    pub fn net(&self) -> &Mlp {
        &self.net
    }
}

impl Parameterized for Actor {
    fn n_params(&self) -> usize {
        self.net.n_params()
    }

    fn get_params(&self) -> ParameterVector {
        self.net.get_params()
    }

    fn set_params(&mut self, params: &[f64]) -> Result<(), TrainError> {
        self.net.set_params(params)
    }
}

impl Policy for Actor {
    fn action_dim(&self) -> usize {
        self.net.output_dim()
    }

    fn act(&self, obs: &[f64]) -> Vec<f64> {
        self.net.forward(obs).into_iter().map(|a| a * self.max_action).collect()
    }
}

/// State-action value `Q(s, a)`, ReLU hidden layers, linear output.
#[derive(Debug, Clone)]
pub struct Critic {
    net: Mlp,
    obs_dim: usize,
}

impl Critic {
    pub fn new(obs_dim: usize, action_dim: usize, hidden: &[usize], rng: &mut impl Rng) -> Self {
        Critic {
            net: Mlp::new(obs_dim + action_dim, 1, hidden, Activation::Relu, Activation::Identity, rng),
            obs_dim,
        }
    }

    pub fn net(&self) -> &Mlp {
        &self.net
    }

    pub fn q(&self, state: &[f64], action: &[f64]) -> f64 {
        self.net.forward(&concat(state, action))[0]
    }
}

impl Parameterized for Critic {
    fn n_params(&self) -> usize {
        self.net.n_params()
    }

    fn get_params(&self) -> ParameterVector {
        self.net.get_params()
    }

    fn set_params(&mut self, params: &[f64]) -> Result<(), TrainError> {
        self.net.set_params(params)
    }
}

fn concat(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut x = Vec::with_capacity(a.len() + b.len());
    x.extend_from_slice(a);
    x.extend_from_slice(b);
    x
}

// ─── Learner ────────────────────────────────────────────────────────

/// Hyperparameters of the gradient side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdpgConfig {
    pub actor_lr: f64,
    pub critic_lr: f64,
    pub batch_size: usize,
    pub discount: f64,
    /// Soft target-update rate.
    pub tau: f64,
    pub hidden: Vec<usize>,
    pub use_td3: bool,
    pub policy_noise: f64,
    pub noise_clip: f64,
    pub policy_freq: usize,
}

impl Default for DdpgConfig {
    fn default() -> Self {
        DdpgConfig {
            actor_lr: 1e-3,
            critic_lr: 1e-3,
            batch_size: 100,
            discount: 0.99,
            tau: 0.005,
            hidden: vec![400, 300],
            use_td3: false,
            policy_noise: 0.2,
            noise_clip: 0.5,
            policy_freq: 2,
        }
    }
}

struct ActorSlot {
    actor: Actor,
    target: Actor,
    adam: Adam,
}

struct CriticSlot {
    critic: Critic,
    target: Critic,
    adam: Adam,
}

/// Losses of one `train_step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateStats {
    pub critic_loss: f64,
    /// `None` when TD3 delayed the actor update.
    pub actor_loss: Option<f64>,
}

/// `n_grad` actors sharing one critic (a pair under TD3).
pub struct GradientLearner {
    config: DdpgConfig,
    actors: Vec<ActorSlot>,
    critics: Vec<CriticSlot>,
    max_action: f64,
    critic_updates: usize,
}

impl GradientLearner {
    pub fn new(
        obs_dim: usize,
        action_dim: usize,
        max_action: f64,
        n_actors: usize,
        config: DdpgConfig,
        rng: &mut impl Rng,
    ) -> Self {
        let actors = (0..n_actors)
            .map(|_| {
                let actor = Actor::new(obs_dim, action_dim, max_action, &config.hidden, rng);
                ActorSlot {
                    target: actor.clone(),
                    adam: Adam::new(actor.n_params(), config.actor_lr),
                    actor,
                }
            })
            .collect();
        let n_critics = if config.use_td3 { 2 } else { 1 };
        let critics = (0..n_critics)
            .map(|_| {
                let critic = Critic::new(obs_dim, action_dim, &config.hidden, rng);
                CriticSlot {
                    target: critic.clone(),
                    adam: Adam::new(critic.n_params(), config.critic_lr),
                    critic,
                }
            })
            .collect();

        GradientLearner {
            config,
            actors,
            critics,
            max_action,
            critic_updates: 0,
        }
    }

    pub fn n_actors(&self) -> usize {
        self.actors.len()
    }

    pub fn actor(&self, i: usize) -> &Actor {
        &self.actors[i].actor
    }

    /// Online critics: one for DDPG, two for TD3.
    pub fn critics(&self) -> impl Iterator<Item = &Critic> {
        self.critics.iter().map(|c| &c.critic)
    }

    /// One critic update followed by one actor update for actor `i`.
    ///
    /// Fails with `InsufficientBuffer` before touching any weights when the
    /// buffer cannot fill a batch.
    pub fn train_step(
        &mut self,
        i: usize,
        buffer: &ReplayBuffer,
        rng: &mut impl Rng,
    ) -> Result<UpdateStats, TrainError> {
        let critic_batch = buffer.sample(self.config.batch_size, rng)?;
        let actor_batch = buffer.sample(self.config.batch_size, rng)?;

        let critic_loss = self.update_critics(i, &critic_batch, rng);
        self.critic_updates += 1;

        let delayed = self.config.use_td3 && self.critic_updates % self.config.policy_freq.max(1) != 0;
        if delayed {
            return Ok(UpdateStats { critic_loss, actor_loss: None });
        }

        let actor_loss = self.update_actor(i, &actor_batch);
        let tau = self.config.tau;
        let slot = &mut self.actors[i];
        soft_update(slot.target.net.params_mut(), slot.actor.net.params(), tau);
        for c in self.critics.iter_mut() {
            soft_update(c.target.net.params_mut(), c.critic.net.params(), tau);
        }
        Ok(UpdateStats {
            critic_loss,
            actor_loss: Some(actor_loss),
        })
    }

    /// Regress every critic onto `r + (1 - done) * γ * Q_target(s', π_target(s'))`.
    fn update_critics(&mut self, i: usize, batch: &crate::replay::Batch, rng: &mut impl Rng) -> f64 {
        let n = batch.len() as f64;
        let target_actor = &self.actors[i].target;

        let smoothing = if self.config.use_td3 {
            Normal::new(0.0, self.config.policy_noise.max(0.0)).ok()
        } else {
            None
        };

        let targets: Vec<f64> = (0..batch.len())
            .map(|k| {
                let s_next = &batch.next_states[k];
                let mut a_next = target_actor.act(s_next);
                if let Some(dist) = smoothing.as_ref() {
                    let clip = self.config.noise_clip;
                    for a in a_next.iter_mut() {
                        let eps: f64 = dist.sample(&mut *rng);
                        *a = (*a + eps.clamp(-clip, clip)).clamp(-self.max_action, self.max_action);
                    }
                }
                // Clipped double-Q under TD3
                let q_next = self
                    .critics
                    .iter()
                    .map(|c| c.target.q(s_next, &a_next))
                    .fold(f64::INFINITY, f64::min);
                batch.rewards[k] + (1.0 - batch.dones[k]) * self.config.discount * q_next
            })
            .collect();

        let mut total_loss = 0.0;
        for slot in self.critics.iter_mut() {
            let mut grad = vec![0.0; slot.critic.n_params()];
            for (k, &y) in targets.iter().enumerate() {
                let fwd = slot.critic.net.forward_cached(&concat(&batch.states[k], &batch.actions[k]));
                let err = fwd.output[0] - y;
                total_loss += err * err / n;
                slot.critic.net.backward(&fwd, &[2.0 * err / n], &mut grad);
            }
            slot.adam.apply(slot.critic.net.params_mut(), &grad);
        }
        total_loss / self.critics.len() as f64
    }

    /// Ascend `Q(s, π(s))` through the first critic.
    fn update_actor(&mut self, i: usize, batch: &crate::replay::Batch) -> f64 {
        let n = batch.len() as f64;
        let critic = &self.critics[0].critic;
        let obs_dim = critic.obs_dim;
        let slot = &mut self.actors[i];
        let max_action = slot.actor.max_action;

        let mut grad = vec![0.0; slot.actor.n_params()];
        let mut scratch = vec![0.0; critic.n_params()];
        let mut loss = 0.0;

        for s in &batch.states {
            let a_fwd = slot.actor.net.forward_cached(s);
            let action: Vec<f64> = a_fwd.output.iter().map(|a| a * max_action).collect();
            let q_fwd = critic.net.forward_cached(&concat(s, &action));
            loss -= q_fwd.output[0] / n;

            // dL/da = -(1/n) dQ/da; the critic's own gradient is discarded
            let d_input = critic.net.backward(&q_fwd, &[-1.0 / n], &mut scratch);
            let d_action: Vec<f64> = d_input[obs_dim..].iter().map(|d| d * max_action).collect();
            slot.actor.net.backward(&a_fwd, &d_action, &mut grad);
        }
        slot.adam.apply(slot.actor.net.params_mut(), &grad);
        loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::Transition;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config(use_td3: bool) -> DdpgConfig {
        DdpgConfig {
            batch_size: 16,
            hidden: vec![16, 16],
            use_td3,
            ..DdpgConfig::default()
        }
    }

    /// One-step bandit: reward = -(a - 0.5)^2, always terminal.
    fn bandit_buffer(rng: &mut StdRng) -> ReplayBuffer {
        let mut buf = ReplayBuffer::new(1000);
        for _ in 0..500 {
            let a: f64 = rng.gen_range(-1.0..1.0);
            buf.push(Transition {
                state: vec![1.0],
                next_state: vec![1.0],
                action: vec![a],
                reward: -(a - 0.5) * (a - 0.5),
                done: 1.0,
            });
        }
        buf
    }

    #[test]
    fn test_adam_descends_quadratic() {
        let mut adam = Adam::new(1, 0.1);
        let mut x = [3.0];
        for _ in 0..500 {
            let g = [2.0 * x[0]];
            adam.apply(&mut x, &g);
        }
        assert!(x[0].abs() < 0.05);
    }

    #[test]
    fn test_actor_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut actor = Actor::new(3, 2, 2.0, &[8], &mut rng);
        let big: Vec<f64> = vec![100.0; actor.n_params()];
        actor.set_params(&big).unwrap();
        for a in actor.act(&[1.0, 1.0, 1.0]) {
            assert!(a.abs() <= 2.0);
        }
    }

    #[test]
    fn test_insufficient_buffer_leaves_weights_untouched() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut learner = GradientLearner::new(1, 1, 1.0, 1, small_config(false), &mut rng);
        let before = learner.actor(0).get_params();
        let buf = ReplayBuffer::new(100);
        let err = learner.train_step(0, &buf, &mut rng).unwrap_err();
        assert_eq!(err, TrainError::InsufficientBuffer { len: 0, batch_size: 16 });
        assert_eq!(learner.actor(0).get_params(), before);
    }

    #[test]
    fn test_ddpg_learns_bandit() {
        let mut rng = StdRng::seed_from_u64(4);
        let buf = bandit_buffer(&mut rng);
        let config = DdpgConfig { critic_lr: 3e-3, ..small_config(false) };
        let mut learner = GradientLearner::new(1, 1, 1.0, 1, config, &mut rng);
        let mut first = None;
        let mut last = 0.0;
        for _ in 0..2000 {
            let stats = learner.train_step(0, &buf, &mut rng).unwrap();
            first.get_or_insert(stats.critic_loss);
            last = stats.critic_loss;
        }
        assert!(last < first.unwrap());
        let a = learner.actor(0).act(&[1.0])[0];
        assert!((a - 0.5).abs() < 0.25, "action {a}");
    }

    #[test]
    fn test_td3_delays_actor_updates() {
        let mut rng = StdRng::seed_from_u64(5);
        let buf = bandit_buffer(&mut rng);
        let mut learner = GradientLearner::new(1, 1, 1.0, 1, small_config(true), &mut rng);
        assert_eq!(learner.critics().count(), 2);
        let s1 = learner.train_step(0, &buf, &mut rng).unwrap();
        let s2 = learner.train_step(0, &buf, &mut rng).unwrap();
        assert!(s1.actor_loss.is_none());
        assert!(s2.actor_loss.is_some());
    }
}
