//! Training loop: evolutionary population and gradient actors co-trained on
//! one replay buffer, fused into a single selection each generation.

use crate::config::TrainConfig;
use crate::ddpg::{Actor, GradientLearner};
use crate::env::{self, EnvConfig, Environment};
use crate::error::TrainError;
use crate::noise::ActionNoise;
use crate::optim::SepCem;
use crate::policy::{ParameterVector, Parameterized};
use crate::replay::{ReplayBuffer, Transition};
use crate::rollout::{Evaluation, Evaluator};
use crate::storage::{self, Checkpoint};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Per-run execution context. Every random draw of a run comes from `rng`.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub rng: StdRng,
    pub seed: u64,
}

impl RunContext {
    /// Seed from `seed`, or from entropy when `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
        RunContext {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Only evolutionary rollouts; no gradient updates.
    Warmup,
    Active,
}

/// Summary appended to the run log at each checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub total_steps: usize,
    pub average_score: f64,
    /// `None` while no gradient actor was evaluated.
    pub average_score_rl: Option<f64>,
    pub average_score_ea: f64,
    pub best_score: f64,
}

/// What one generation did.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub generation: usize,
    pub phase: Phase,
    pub ea_params: Vec<ParameterVector>,
    pub ea_fitness: Vec<f64>,
    pub rl_fitness: Vec<f64>,
    /// Gradient updates skipped for lack of data.
    pub skipped_updates: usize,
    pub steps: usize,
    pub total_steps: usize,
    pub checkpoint: Option<PathBuf>,
    pub elapsed: f64,
}

/// Final result of `train`.
#[derive(Debug)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub records: Vec<RunRecord>,
    pub total_steps: usize,
    pub generations: usize,
}

fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

/// Concatenate evolutionary then gradient candidates, keeping each
/// parameter vector at the same index as its fitness.
pub fn fuse(
    ea_params: Vec<ParameterVector>,
    ea_fitness: &[f64],
    rl_params: Vec<ParameterVector>,
    rl_fitness: &[f64],
) -> (Vec<ParameterVector>, Vec<f64>) {
    let mut params = ea_params;
    params.extend(rl_params);
    let mut fitness = ea_fitness.to_vec();
    fitness.extend_from_slice(rl_fitness);
    (params, fitness)
}

pub struct Trainer {
    config: TrainConfig,
    env_config: EnvConfig,
    env: Box<dyn Environment>,
    buffer: ReplayBuffer,
    learner: GradientLearner,
    es: SepCem,
    /// Network the evolutionary candidates are loaded into.
    actor_ea: Actor,
    evaluator: Evaluator,
    ea_noise: Option<Box<dyn ActionNoise>>,
    grad_noise: Option<Box<dyn ActionNoise>>,
    ctx: RunContext,
    run_dir: Option<PathBuf>,
    total_steps: usize,
    step_cpt: usize,
    generation: usize,
    records: Vec<RunRecord>,
}

impl Trainer {
    /// Build every collaborator. Checkpoints go to `run_dir` when given.
    pub fn new(config: TrainConfig, mut ctx: RunContext, run_dir: Option<PathBuf>) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let env = env::make(&config.env, Some(ctx.rng.gen()))?;
        let env_config = env.config().clone();
        let (obs_dim, action_dim, max_action) = (env_config.obs_dim, env_config.action_dim, env_config.max_action);

        let learner = GradientLearner::new(
            obs_dim,
            action_dim,
            max_action,
            config.n_grad,
            config.ddpg.clone(),
            &mut ctx.rng,
        );
        let actor_ea = Actor::new(obs_dim, action_dim, max_action, &config.ddpg.hidden, &mut ctx.rng);
        let es = SepCem::new(
            actor_ea.n_params(),
            Some(actor_ea.get_params()),
            config.pop_size,
            config.cem.clone(),
        )?;

        tracing::info!(
            env = %env_config,
            n_params = actor_ea.n_params(),
            pop_size = config.pop_size,
            n_grad = config.n_grad,
            td3 = config.ddpg.use_td3,
            seed = ctx.seed,
            "Trainer ready"
        );

        Ok(Trainer {
            buffer: ReplayBuffer::new(config.mem_size),
            evaluator: Evaluator {
                reward_scale: config.reward_scale,
                render: config.render,
            },
            ea_noise: config.ea_noise.build(action_dim),
            grad_noise: config.grad_noise.build(action_dim),
            config,
            env_config,
            env,
            learner,
            es,
            actor_ea,
            ctx,
            run_dir,
            total_steps: 0,
            step_cpt: 0,
            generation: 0,
            records: Vec::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        if self.total_steps > self.config.start_steps {
            Phase::Active
        } else {
            Phase::Warmup
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn steps_since_checkpoint(&self) -> usize {
        self.step_cpt
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn es(&self) -> &SepCem {
        &self.es
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn learner(&self) -> &GradientLearner {
        &self.learner
    }

    /// One ask / train / evaluate / tell / checkpoint cycle.
    pub fn generation(&mut self) -> Result<GenerationReport> {
        let start = Instant::now();
        let phase = self.phase();
        let ea_params = self.es.ask(self.config.pop_size, &mut self.ctx.rng)?;

        let mut steps = 0;
        let mut skipped_updates = 0;
        let mut rl_params = Vec::new();
        let mut rl_fitness = Vec::new();

        if phase == Phase::Active {
            for i in 0..self.learner.n_actors() {
                match self.learner.train_step(i, &self.buffer, &mut self.ctx.rng) {
                    Ok(stats) => {
                        tracing::debug!(actor = i, critic_loss = stats.critic_loss, actor_loss = ?stats.actor_loss, "Gradient step");
                    }
                    Err(TrainError::InsufficientBuffer { len, batch_size }) => {
                        tracing::debug!(actor = i, len, batch_size, "Skipping gradient step, buffer too small");
                        skipped_updates += 1;
                    }
                    Err(e) => return Err(e.into()),
                }

                let actor = self.learner.actor(i);
                let eval = self.evaluator.evaluate(
                    actor,
                    self.env.as_mut(),
                    self.config.n_episodes,
                    Some(&mut self.buffer),
                    self.grad_noise.as_mut(),
                    &mut self.ctx.rng,
                )?;
                tracing::debug!(actor = i, fitness = eval.mean_return, "RL actor evaluated");
                steps += eval.steps;
                rl_params.push(actor.get_params());
                rl_fitness.push(eval.mean_return);
            }
        }

        let ea_evals = if self.config.parallel {
            self.evaluate_population_parallel(&ea_params)?
        } else {
            self.evaluate_population(&ea_params)?
        };
        let ea_fitness: Vec<f64> = ea_evals.iter().map(|e| e.mean_return).collect();
        steps += ea_evals.iter().map(|e| e.steps).sum::<usize>();

        self.total_steps += steps;
        self.step_cpt += steps;

        let (params, fitness) = fuse(ea_params.clone(), &ea_fitness, rl_params, &rl_fitness);
        self.es.tell(&params, &fitness)?;
        self.generation += 1;

        let checkpoint = if self.step_cpt >= self.config.period {
            let dir = self.checkpoint(&ea_fitness, &rl_fitness, &fitness)?;
            self.step_cpt = 0;
            dir
        } else {
            None
        };

        Ok(GenerationReport {
            generation: self.generation,
            phase,
            ea_params,
            ea_fitness,
            rl_fitness,
            skipped_updates,
            steps,
            total_steps: self.total_steps,
            checkpoint,
            elapsed: start.elapsed().as_secs_f64(),
        })
    }

    /// Evaluate candidates one after the other on the shared environment.
    fn evaluate_population(&mut self, population: &[ParameterVector]) -> Result<Vec<Evaluation>> {
        let mut evals = Vec::with_capacity(population.len());
        for (k, params) in population.iter().enumerate() {
            self.actor_ea.set_params(params)?;
            let eval = self.evaluator.evaluate(
                &self.actor_ea,
                self.env.as_mut(),
                self.config.n_episodes,
                Some(&mut self.buffer),
                self.ea_noise.as_mut(),
                &mut self.ctx.rng,
            )?;
            tracing::debug!(candidate = k, fitness = eval.mean_return, "EA actor evaluated");
            evals.push(eval);
        }
        Ok(evals)
    }

    /// Evaluate candidates concurrently, one environment and generator per
    /// candidate. Transitions reach the buffer in candidate order once all
    /// rollouts are done.
    fn evaluate_population_parallel(&mut self, population: &[ParameterVector]) -> Result<Vec<Evaluation>> {
        let seeds: Vec<u64> = population.iter().map(|_| self.ctx.rng.gen()).collect();
        let template = &self.actor_ea;
        let env_name = self.config.env.as_str();
        let noise_config = self.config.ea_noise;
        let action_dim = self.env_config.action_dim;
        let episodes = self.config.n_episodes;
        let evaluator = self.evaluator;

        let results: Vec<(Evaluation, Vec<Transition>)> = population
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(params, &seed)| -> Result<(Evaluation, Vec<Transition>)> {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut actor = template.clone();
                actor.set_params(params)?;
                let mut env = env::make(env_name, None)?;
                let mut noise = noise_config.build(action_dim);
                let mut transitions = Vec::new();
                let eval = evaluator.evaluate(
                    &actor,
                    env.as_mut(),
                    episodes,
                    Some(&mut transitions),
                    noise.as_mut(),
                    &mut rng,
                )?;
                Ok((eval, transitions))
            })
            .collect::<Result<_>>()?;

        let mut evals = Vec::with_capacity(results.len());
        for (k, (eval, transitions)) in results.into_iter().enumerate() {
            tracing::debug!(candidate = k, fitness = eval.mean_return, "EA actor evaluated");
            self.buffer.extend(transitions);
            evals.push(eval);
        }
        Ok(evals)
    }

    /// Append a summary record and, with a run directory, persist the full
    /// log and every network.
    fn checkpoint(&mut self, ea_fitness: &[f64], rl_fitness: &[f64], fitness: &[f64]) -> Result<Option<PathBuf>> {
        let record = RunRecord {
            total_steps: self.total_steps,
            average_score: mean(fitness).unwrap_or(f64::NAN),
            average_score_rl: mean(rl_fitness),
            average_score_ea: mean(ea_fitness).unwrap_or(f64::NAN),
            best_score: fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };

        tracing::info!(
            total_steps = record.total_steps,
            average = record.average_score,
            average_rl = ?record.average_score_rl,
            average_ea = record.average_score_ea,
            best = record.best_score,
            "Checkpoint"
        );
        self.records.push(record);

        let dir = match self.run_dir.clone() {
            Some(run_dir) => {
                storage::write_log(&run_dir, &self.records)?;
                let dir = storage::checkpoint_dir(&run_dir, self.total_steps);
                self.save_networks(&dir)?;
                Some(dir)
            }
            None => None,
        };
        Ok(dir)
    }

    fn save_networks(&mut self, dir: &Path) -> Result<()> {
        for (k, critic) in self.learner.critics().enumerate() {
            let role = if k == 0 { "critic".to_string() } else { format!("critic_{}", k + 1) };
            storage::save_checkpoint(dir, &Checkpoint::from_net(role, critic.net()))?;
        }
        for i in 0..self.learner.n_actors() {
            let actor = self.learner.actor(i);
            storage::save_checkpoint(dir, &Checkpoint::from_net(format!("actor_{i}"), actor.net()))?;
        }
        self.actor_ea.set_params(self.es.mean())?;
        storage::save_checkpoint(dir, &Checkpoint::from_net("actor_mu", self.actor_ea.net()))?;
        Ok(())
    }

    /// Run generations until the step budget is spent.
    pub fn run(&mut self) -> Result<()> {
        while self.total_steps < self.config.max_steps {
            let report = self.generation()?;
            let best = report
                .ea_fitness
                .iter()
                .chain(&report.rl_fitness)
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            tracing::info!(
                generation = report.generation,
                phase = ?report.phase,
                total_steps = report.total_steps,
                best,
                mean_ea = ?mean(&report.ea_fitness),
                mean_rl = ?mean(&report.rl_fitness),
                sigma = self.es.mean_std(),
                elapsed = report.elapsed,
                "Generation"
            );
        }
        Ok(())
    }

    pub fn into_summary(self) -> RunSummary {
        RunSummary {
            run_dir: self.run_dir.unwrap_or_default(),
            records: self.records,
            total_steps: self.total_steps,
            generations: self.generation,
        }
    }
}

/// Train mode: new run directory, parameters manifest, then the full loop.
pub fn train(config: TrainConfig, ctx: RunContext) -> Result<RunSummary> {
    config.validate().context("invalid configuration")?;
    let run_dir = storage::get_output_folder(&config.output, &config.env)?;
    storage::write_parameters(&run_dir, &config)?;
    tracing::info!(run_dir = %run_dir.display(), "Starting run");

    let mut trainer = Trainer::new(config, ctx, Some(run_dir))?;
    trainer.run()?;
    Ok(trainer.into_summary())
}

/// Test mode: evaluate a saved actor noise-free for `n_test` episodes.
/// Returns every episode's return.
pub fn test(config: &TrainConfig, ctx: &mut RunContext) -> Result<Vec<f64>> {
    let path = config
        .filename
        .as_deref()
        .context("test mode needs an actor checkpoint (--filename)")?;
    let checkpoint = storage::load_checkpoint(path)?;

    let mut env = env::make(&config.env, Some(ctx.rng.gen()))?;
    let cfg = env.config().clone();
    let mut actor = Actor::new(cfg.obs_dim, cfg.action_dim, cfg.max_action, &config.ddpg.hidden, &mut ctx.rng);
    checkpoint.check_shape(actor.net())?;
    actor.set_params(&checkpoint.params)?;

    let evaluator = Evaluator {
        reward_scale: 1.0,
        render: config.render,
    };
    let mut returns = Vec::with_capacity(config.n_test);
    for episode in 0..config.n_test {
        let eval = evaluator.evaluate(&actor, env.as_mut(), 1, None, None, &mut ctx.rng)?;
        tracing::info!(episode, score = eval.mean_return, "Test episode");
        returns.push(eval.mean_return);
    }
    tracing::info!(
        role = %checkpoint.role,
        mean = ?mean(&returns),
        episodes = returns.len(),
        "Test finished"
    );
    Ok(returns)
}
