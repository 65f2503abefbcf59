use anyhow::Result;
use cem_rl::config::TrainConfig;
use cem_rl::ddpg::DdpgConfig;
use cem_rl::noise::{NoiseConfig, NoiseKind};
use cem_rl::optim::{CemConfig, Weighting};
use cem_rl::runner::{self, RunContext};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Train,
    Test,
}

#[derive(Parser)]
#[command(name = "cem-rl", about = "Hybrid CEM + DDPG/TD3 trainer for continuous control")]
struct Cli {
    #[arg(long, value_enum, default_value = "train")]
    mode: Mode,

    /// Environment id (Pendulum-v1, Swimmer-v1, CartPoleContinuous-v1)
    #[arg(long, default_value = "Pendulum-v1")]
    env: String,

    /// Environment steps before gradient updates start
    #[arg(long, default_value = "10000")]
    start_steps: usize,

    // DDPG
    #[arg(long, default_value = "0.001")]
    actor_lr: f64,

    #[arg(long, default_value = "0.001")]
    critic_lr: f64,

    #[arg(long, default_value = "100")]
    batch_size: usize,

    #[arg(long, default_value = "0.99")]
    discount: f64,

    #[arg(long, default_value = "1.0")]
    reward_scale: f64,

    /// Soft target-update rate
    #[arg(long, default_value = "0.005")]
    tau: f64,

    /// Hidden layer sizes, comma separated
    #[arg(long, value_delimiter = ',', default_value = "400,300")]
    hidden: Vec<usize>,

    // TD3
    #[arg(long)]
    use_td3: bool,

    #[arg(long, default_value = "0.2")]
    policy_noise: f64,

    #[arg(long, default_value = "0.5")]
    noise_clip: f64,

    #[arg(long, default_value = "2")]
    policy_freq: usize,

    // Exploration noise
    /// Noise on gradient-actor rollouts
    #[arg(long, value_enum, default_value = "none")]
    grad_noise: NoiseKind,

    /// Noise on evolutionary rollouts
    #[arg(long, value_enum, default_value = "none")]
    ea_noise: NoiseKind,

    #[arg(long, default_value = "0.1")]
    gauss_sigma: f64,

    #[arg(long, default_value = "0.15")]
    ou_theta: f64,

    #[arg(long, default_value = "0.2")]
    ou_sigma: f64,

    #[arg(long, default_value = "0.0")]
    ou_mu: f64,

    // CEM
    #[arg(long, default_value = "10")]
    pop_size: usize,

    /// Number of gradient-trained actors
    #[arg(long, default_value = "1")]
    n_grad: usize,

    /// Parents kept by selection (defaults to n_grad)
    #[arg(long)]
    parents: Option<usize>,

    /// Initial per-dimension variance
    #[arg(long, default_value = "0.05")]
    sigma_init: f64,

    #[arg(long, default_value = "0.001")]
    damp: f64,

    #[arg(long, default_value = "0.00001")]
    damp_limit: f64,

    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    antithetic: bool,

    #[arg(long)]
    elitism: bool,

    #[arg(long, value_enum, default_value = "log")]
    weighting: Weighting,

    // Training
    /// Episodes per fitness evaluation
    #[arg(long, default_value = "1")]
    n_episodes: usize,

    /// Global environment-step budget
    #[arg(long, default_value = "1000000")]
    max_steps: usize,

    /// Replay buffer capacity
    #[arg(long, default_value = "1000000")]
    mem_size: usize,

    // Testing
    /// Actor checkpoint to evaluate in test mode
    #[arg(long)]
    filename: Option<PathBuf>,

    #[arg(long, default_value = "1")]
    n_test: usize,

    // Misc
    #[arg(long, env = "CEMRL_OUTPUT", default_value = "results")]
    output: PathBuf,

    /// Environment steps between checkpoints
    #[arg(long, default_value = "5000")]
    period: usize,

    #[arg(long, env = "CEMRL_SEED")]
    seed: Option<u64>,

    /// Trace every observation
    #[arg(long)]
    render: bool,

    /// Evaluate the population on the rayon thread pool
    #[arg(long)]
    parallel: bool,
}

impl Cli {
    fn into_config(self) -> TrainConfig {
        let noise = |kind| NoiseConfig {
            kind,
            gauss_sigma: self.gauss_sigma,
            ou_theta: self.ou_theta,
            ou_sigma: self.ou_sigma,
            ou_mu: self.ou_mu,
        };
        TrainConfig {
            grad_noise: noise(self.grad_noise),
            ea_noise: noise(self.ea_noise),
            ddpg: DdpgConfig {
                actor_lr: self.actor_lr,
                critic_lr: self.critic_lr,
                batch_size: self.batch_size,
                discount: self.discount,
                tau: self.tau,
                hidden: self.hidden.clone(),
                use_td3: self.use_td3,
                policy_noise: self.policy_noise,
                noise_clip: self.noise_clip,
                policy_freq: self.policy_freq,
            },
            cem: CemConfig {
                sigma_init: self.sigma_init,
                damp: self.damp,
                damp_limit: self.damp_limit,
                parents: self.parents.unwrap_or(self.n_grad),
                antithetic: self.antithetic,
                elitism: self.elitism,
                weighting: self.weighting,
                ..CemConfig::default()
            },
            env: self.env.clone(),
            start_steps: self.start_steps,
            reward_scale: self.reward_scale,
            pop_size: self.pop_size,
            n_grad: self.n_grad,
            n_episodes: self.n_episodes,
            max_steps: self.max_steps,
            mem_size: self.mem_size,
            period: self.period,
            output: self.output.clone(),
            seed: self.seed,
            render: self.render,
            parallel: self.parallel,
            filename: self.filename.clone(),
            n_test: self.n_test,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mode = cli.mode;
    let config = cli.into_config();
    config.validate()?;
    let mut ctx = RunContext::new(config.seed);

    match mode {
        Mode::Train => {
            let summary = runner::train(config, ctx)?;
            let best = summary.records.iter().map(|r| r.best_score).fold(f64::NEG_INFINITY, f64::max);
            tracing::info!(
                run_dir = %summary.run_dir.display(),
                total_steps = summary.total_steps,
                generations = summary.generations,
                checkpoints = summary.records.len(),
                best,
                "Training finished"
            );
        }
        Mode::Test => {
            runner::test(&config, &mut ctx)?;
        }
    }
    Ok(())
}
