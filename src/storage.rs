//! On-disk layout of a training run.
//!
//! ```text
//! <output>/<env>-run<N>/
//!     parameters.txt          key = value, written once
//!     log.json                summary records, rewritten at each checkpoint
//!     <total_steps>_steps/    critic.json, actor_<i>.json, actor_mu.json
//! ```

use crate::policy::Mlp;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Weights of one network role, as stored in a checkpoint directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub role: String,
    /// `(fan_in, fan_out)` of every layer.
    pub layer_dims: Vec<(usize, usize)>,
    pub params: Vec<f64>,
}

impl Checkpoint {
    pub fn from_net(role: impl Into<String>, net: &Mlp) -> Self {
        Checkpoint {
            role: role.into(),
            layer_dims: net.layer_dims().to_vec(),
            params: net.params().to_vec(),
        }
    }

    /// Fails unless the stored shape matches `net`.
    pub fn check_shape(&self, net: &Mlp) -> Result<()> {
        if self.layer_dims != net.layer_dims() {
            bail!(
                "checkpoint '{}' has layers {:?}, network expects {:?}",
                self.role,
                self.layer_dims,
                net.layer_dims()
            );
        }
        Ok(())
    }
}

/// Create `<parent>/<env>-run<N>` with `N` one past the highest existing run.
pub fn get_output_folder(parent: &Path, env_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;

    let prefix = format!("{env_name}-run");
    let mut last = 0u32;
    for entry in fs::read_dir(parent).with_context(|| format!("reading {}", parent.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(n) = name.to_str().and_then(|s| s.strip_prefix(&prefix)).and_then(|s| s.parse::<u32>().ok()) {
            last = last.max(n);
        }
    }

    let dir = parent.join(format!("{prefix}{}", last + 1));
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                flatten(&key, v, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

/// Render any serializable config as `key = value` lines, nested fields dotted.
pub fn manifest_lines(config: &impl Serialize) -> Result<Vec<String>> {
    let value = serde_json::to_value(config)?;
    let mut pairs = Vec::new();
    flatten("", &value, &mut pairs);
    Ok(pairs.into_iter().map(|(k, v)| format!("{k} = {v}")).collect())
}

pub fn write_parameters(run_dir: &Path, config: &impl Serialize) -> Result<()> {
    let mut text = manifest_lines(config)?.join("\n");
    text.push('\n');
    let path = run_dir.join("parameters.txt");
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
}

pub fn checkpoint_dir(run_dir: &Path, total_steps: usize) -> PathBuf {
    run_dir.join(format!("{total_steps}_steps"))
}

/// Write `<dir>/<role>.json`, creating `dir` if needed.
pub fn save_checkpoint(dir: &Path, checkpoint: &Checkpoint) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{}.json", checkpoint.role));
    let json = serde_json::to_string(checkpoint)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn load_checkpoint(path: &Path) -> Result<Checkpoint> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Overwrite `<run_dir>/log.json` with the full record list.
pub fn write_log<T: Serialize>(run_dir: &Path, records: &[T]) -> Result<()> {
    let path = run_dir.join("log.json");
    let json = serde_json::to_string_pretty(records)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Activation;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_run_numbers_increase() {
        let tmp = tempfile::tempdir().unwrap();
        let a = get_output_folder(tmp.path(), "Pendulum-v1").unwrap();
        let b = get_output_folder(tmp.path(), "Pendulum-v1").unwrap();
        let other = get_output_folder(tmp.path(), "Swimmer-v1").unwrap();
        assert!(a.ends_with("Pendulum-v1-run1"));
        assert!(b.ends_with("Pendulum-v1-run2"));
        assert!(other.ends_with("Swimmer-v1-run1"));

        fs::create_dir(tmp.path().join("Pendulum-v1-run9")).unwrap();
        let c = get_output_folder(tmp.path(), "Pendulum-v1").unwrap();
        assert!(c.ends_with("Pendulum-v1-run10"));
    }

    #[test]
    fn test_manifest_flattens_nested_fields() {
        #[derive(Serialize)]
        struct Inner {
            tau: f64,
        }
        #[derive(Serialize)]
        struct Outer {
            env: String,
            seed: Option<u64>,
            ddpg: Inner,
        }
        let lines = manifest_lines(&Outer {
            env: "Pendulum-v1".into(),
            seed: None,
            ddpg: Inner { tau: 0.005 },
        })
        .unwrap();
        // Keys come out sorted
        assert_eq!(lines, vec!["ddpg.tau = 0.005", "env = Pendulum-v1", "seed = null"]);
    }

    #[test]
    fn test_checkpoint_roundtrip_and_shape_check() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let net = Mlp::new(3, 1, &[4], Activation::Relu, Activation::Tanh, &mut rng);
        let dir = checkpoint_dir(tmp.path(), 5000);
        let path = save_checkpoint(&dir, &Checkpoint::from_net("actor_0", &net)).unwrap();
        assert!(path.ends_with("5000_steps/actor_0.json"));

        let loaded = load_checkpoint(&path).unwrap();
        assert_eq!(loaded.params, net.params());
        assert!(loaded.check_shape(&net).is_ok());

        let other = Mlp::new(3, 1, &[5], Activation::Relu, Activation::Tanh, &mut rng);
        assert!(loaded.check_shape(&other).is_err());
    }
}
