//! Scoring a policy by running it in an environment.

use crate::env::Environment;
use crate::error::EnvError;
use crate::noise::ActionNoise;
use crate::policy::Policy;
use crate::replay::{Transition, TransitionSink};
use rand::Rng;

/// Outcome of `Evaluator::evaluate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Arithmetic mean of the undiscounted episode returns.
    pub mean_return: f64,
    /// Environment steps consumed across all episodes.
    pub steps: usize,
}

/// Runs full episodes and optionally records every transition.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    /// Multiplier applied to rewards stored in the sink. Returns stay unscaled.
    pub reward_scale: f64,
    /// Emit each observation at trace level.
    pub render: bool,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator {
            reward_scale: 1.0,
            render: false,
        }
    }
}

/// Termination flag stored with a transition: a step that lands exactly on the
/// episode limit is a truncation and must keep bootstrapping.
pub fn done_flag(episode_steps: usize, max_steps: usize, done: bool) -> f64 {
    if episode_steps == max_steps || !done {
        0.0
    } else {
        1.0
    }
}

impl Evaluator {
    /// Run `episodes` rollouts of `policy`.
    ///
    /// The environment is reset (with a seed drawn from `rng`) at the start of
    /// each episode. Actions are perturbed by `noise` when given, then clipped
    /// to the action bounds. Environment errors abort the evaluation.
    pub fn evaluate<P: Policy + ?Sized>(
        &self,
        policy: &P,
        env: &mut dyn Environment,
        episodes: usize,
        mut sink: Option<&mut dyn TransitionSink>,
        mut noise: Option<&mut Box<dyn ActionNoise>>,
        rng: &mut impl Rng,
    ) -> Result<Evaluation, EnvError> {
        let config = env.config().clone();
        let mut total = 0.0;
        let mut steps = 0;

        for _ in 0..episodes {
            let mut obs = env.reset(Some(rng.gen()));
            if let Some(n) = noise.as_mut() {
                n.reset();
            }
            let mut score = 0.0;

            loop {
                let mut action = policy.act(&obs);
                if let Some(n) = noise.as_mut() {
                    for (a, e) in action.iter_mut().zip(n.sample(rng)) {
                        *a += e;
                    }
                }
                config.clip(&mut action);

                let result = env.step(&action)?;
                let episode_steps = env.steps();
                let done = result.done() || episode_steps >= config.max_steps;
                score += result.reward;
                steps += 1;

                if self.render {
                    tracing::trace!(step = episode_steps, obs = ?result.observation, reward = result.reward);
                }

                if let Some(s) = sink.as_deref_mut() {
                    s.record(Transition {
                        state: obs,
                        next_state: result.observation.clone(),
                        action,
                        reward: result.reward * self.reward_scale,
                        done: done_flag(episode_steps, config.max_steps, result.terminated),
                    });
                }
                obs = result.observation;

                if done {
                    break;
                }
            }
            total += score;
        }

        let mean_return = if episodes == 0 { 0.0 } else { total / episodes as f64 };
        Ok(Evaluation { mean_return, steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvConfig, StepResult};
    use crate::error::TrainError;
    use crate::noise::GaussianNoise;
    use crate::policy::Parameterized;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Counts steps; terminates after `terminate_at` steps if set.
    struct Corridor {
        config: EnvConfig,
        steps: usize,
        terminate_at: Option<usize>,
        seen_actions: Vec<f64>,
    }

    impl Corridor {
        fn new(max_steps: usize, terminate_at: Option<usize>) -> Self {
            Corridor {
                config: EnvConfig {
                    name: "Corridor".into(),
                    obs_dim: 1,
                    action_dim: 1,
                    max_action: 1.0,
                    max_steps,
                },
                steps: 0,
                terminate_at,
                seen_actions: Vec::new(),
            }
        }
    }

    impl Environment for Corridor {
        fn reset(&mut self, _seed: Option<u64>) -> Vec<f64> {
            self.steps = 0;
            vec![0.0]
        }

        fn step(&mut self, action: &[f64]) -> Result<StepResult, EnvError> {
            self.config.check_action(action)?;
            self.seen_actions.push(action[0]);
            self.steps += 1;
            Ok(StepResult {
                observation: vec![self.steps as f64],
                reward: 1.0,
                terminated: self.terminate_at == Some(self.steps),
                truncated: self.steps >= self.config.max_steps,
            })
        }

        fn config(&self) -> &EnvConfig {
            &self.config
        }

        fn steps(&self) -> usize {
            self.steps
        }
    }

    struct Constant(Vec<f64>);

    impl Parameterized for Constant {
        fn n_params(&self) -> usize {
            self.0.len()
        }
        fn get_params(&self) -> Vec<f64> {
            self.0.clone()
        }
        fn set_params(&mut self, params: &[f64]) -> Result<(), TrainError> {
            self.0 = params.to_vec();
            Ok(())
        }
    }

    impl Policy for Constant {
        fn action_dim(&self) -> usize {
            self.0.len()
        }
        fn act(&self, _obs: &[f64]) -> Vec<f64> {
            self.0.clone()
        }
    }

    #[test]
    fn test_truncation_records_zero_done() {
        let mut env = Corridor::new(5, None);
        let mut rng = StdRng::seed_from_u64(0);
        let mut buf: Vec<Transition> = Vec::new();
        let eval = Evaluator::default()
            .evaluate(&Constant(vec![0.0]), &mut env, 1, Some(&mut buf), None, &mut rng)
            .unwrap();
        assert_eq!(eval.steps, 5);
        assert_eq!(eval.mean_return, 5.0);
        assert_eq!(buf.len(), 5);
        assert!(buf.iter().all(|t| t.done == 0.0));
    }

    #[test]
    fn test_termination_records_one_done() {
        let mut env = Corridor::new(5, Some(3));
        let mut rng = StdRng::seed_from_u64(0);
        let mut buf: Vec<Transition> = Vec::new();
        let eval = Evaluator::default()
            .evaluate(&Constant(vec![0.0]), &mut env, 2, Some(&mut buf), None, &mut rng)
            .unwrap();
        assert_eq!(eval.steps, 6);
        assert_eq!(eval.mean_return, 3.0);
        let dones: Vec<f64> = buf.iter().map(|t| t.done).collect();
        assert_eq!(dones, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(buf[1].state, vec![1.0]);
        assert_eq!(buf[1].next_state, vec![2.0]);
    }

    #[test]
    fn test_termination_on_last_step_counts_as_truncation() {
        assert_eq!(done_flag(5, 5, true), 0.0);
        assert_eq!(done_flag(4, 5, true), 1.0);
        assert_eq!(done_flag(4, 5, false), 0.0);
    }

    #[test]
    fn test_actions_are_clipped_and_noised() {
        let mut env = Corridor::new(50, None);
        let mut rng = StdRng::seed_from_u64(1);
        let mut noise: Box<dyn ActionNoise> = Box::new(GaussianNoise::new(1, 5.0));
        Evaluator::default()
            .evaluate(&Constant(vec![0.5]), &mut env, 1, None, Some(&mut noise), &mut rng)
            .unwrap();
        assert!(env.seen_actions.iter().all(|a| a.abs() <= 1.0));
        assert!(env.seen_actions.iter().any(|a| (*a - 0.5).abs() > 1e-9));
    }

    #[test]
    fn test_reward_scale_applies_to_buffer_only() {
        let mut env = Corridor::new(2, None);
        let mut rng = StdRng::seed_from_u64(0);
        let mut buf: Vec<Transition> = Vec::new();
        let evaluator = Evaluator { reward_scale: 3.0, render: false };
        let eval = evaluator
            .evaluate(&Constant(vec![0.0]), &mut env, 1, Some(&mut buf), None, &mut rng)
            .unwrap();
        assert_eq!(eval.mean_return, 2.0);
        assert!(buf.iter().all(|t| t.reward == 3.0));
    }

    #[test]
    fn test_env_error_propagates() {
        let mut env = Corridor::new(2, None);
        let mut rng = StdRng::seed_from_u64(0);
        let err = Evaluator::default()
            .evaluate(&Constant(vec![0.0, 0.0]), &mut env, 1, None, None, &mut rng)
            .unwrap_err();
        assert_eq!(err, EnvError::ActionDimension { expected: 1, got: 2 });
    }
}
