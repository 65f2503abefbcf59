use cem_rl::config::TrainConfig;
use cem_rl::runner::{self, Phase, RunContext, RunRecord, Trainer};
use cem_rl::storage;
use std::fs;

fn tiny(output: &std::path::Path) -> TrainConfig {
    let mut cfg = TrainConfig {
        env: "Pendulum-v1".into(),
        pop_size: 4,
        n_grad: 1,
        start_steps: 500,
        period: 1000,
        max_steps: 3000,
        output: output.to_path_buf(),
        seed: Some(11),
        ..TrainConfig::default()
    };
    cfg.ddpg.hidden = vec![16, 16];
    cfg.ddpg.batch_size = 32;
    cfg.cem.parents = 2;
    cfg
}

fn assert_same_records(disk: &[RunRecord], memory: &[RunRecord]) {
    assert_eq!(disk.len(), memory.len());
    for (d, m) in disk.iter().zip(memory) {
        assert_eq!(d.total_steps, m.total_steps);
        assert!((d.best_score - m.best_score).abs() < 1e-9);
        assert!((d.average_score - m.average_score).abs() < 1e-9);
    }
}

#[test]
fn training_run_writes_checkpoints_and_log() {
    let tmp = tempfile::tempdir().unwrap();
    let summary = runner::train(tiny(tmp.path()), RunContext::new(Some(11))).unwrap();

    assert!(summary.run_dir.ends_with("Pendulum-v1-run1"));
    assert!(summary.total_steps >= 3000);

    let params = fs::read_to_string(summary.run_dir.join("parameters.txt")).unwrap();
    assert!(params.lines().any(|l| l == "env = Pendulum-v1"));
    assert!(params.lines().any(|l| l == "pop_size = 4"));
    assert!(params.lines().any(|l| l == "cem.parents = 2"));

    // Each generation is a multiple of 200 steps: 800 warmup, then 1000
    let first = &summary.records[0];
    assert_eq!(first.total_steps, 1800);
    let dir = storage::checkpoint_dir(&summary.run_dir, first.total_steps);
    for role in ["critic", "actor_0", "actor_mu"] {
        assert!(dir.join(format!("{role}.json")).is_file(), "missing {role}");
    }
    assert!(!dir.join("critic_2.json").exists());

    let mu = storage::load_checkpoint(&dir.join("actor_mu.json")).unwrap();
    assert_eq!(mu.role, "actor_mu");
    assert_eq!(mu.layer_dims, vec![(3, 16), (16, 16), (16, 1)]);

    // The log on disk holds every record, the newest included
    let log: Vec<RunRecord> =
        serde_json::from_str(&fs::read_to_string(summary.run_dir.join("log.json")).unwrap()).unwrap();
    assert_same_records(&log, &summary.records);
}

#[test]
fn single_checkpoint_run_persists_its_record() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = tiny(tmp.path());
    cfg.pop_size = 2;
    cfg.period = 400;
    cfg.max_steps = 400;
    let summary = runner::train(cfg, RunContext::new(Some(4))).unwrap();
    assert_eq!(summary.records.len(), 1);

    let log: Vec<RunRecord> =
        serde_json::from_str(&fs::read_to_string(summary.run_dir.join("log.json")).unwrap()).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].total_steps, 400);
    assert_eq!(log[0].average_score_rl, None);
}

#[test]
fn second_run_gets_next_folder_and_test_mode_loads_actor() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = tiny(tmp.path());
    cfg.max_steps = 1000;
    cfg.period = 1;
    cfg.ddpg.use_td3 = true;
    runner::train(cfg.clone(), RunContext::new(Some(1))).unwrap();
    let summary = runner::train(cfg.clone(), RunContext::new(Some(2))).unwrap();
    assert!(summary.run_dir.ends_with("Pendulum-v1-run2"));

    let dir = storage::checkpoint_dir(&summary.run_dir, summary.records[0].total_steps);
    assert!(dir.join("critic_2.json").is_file());

    cfg.filename = Some(dir.join("actor_mu.json"));
    cfg.n_test = 3;
    let returns = runner::test(&cfg, &mut RunContext::new(Some(5))).unwrap();
    assert_eq!(returns.len(), 3);
    assert!(returns.iter().all(|r| r.is_finite() && *r <= 0.0));
}

#[test]
fn single_parent_generation_moves_mean_to_best_candidate() {
    let mut cfg = TrainConfig {
        pop_size: 10,
        n_grad: 1,
        start_steps: 1_000_000,
        seed: Some(3),
        ..TrainConfig::default()
    };
    cfg.cem.antithetic = true;
    cfg.cem.parents = 1;
    cfg.cem.sigma_init = 0.05;
    cfg.ddpg.hidden = vec![16];

    let mut trainer = Trainer::new(cfg, RunContext::new(Some(3)), None).unwrap();
    let report = trainer.generation().unwrap();
    assert_eq!(report.phase, Phase::Warmup);
    assert_eq!(report.ea_params.len(), 10);

    let mut sorted = report.ea_fitness.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    sorted.dedup();
    assert_eq!(sorted.len(), 10, "fitnesses should be distinct");

    let best = report
        .ea_fitness
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(trainer.es().mean(), report.ea_params[best].as_slice());
}
