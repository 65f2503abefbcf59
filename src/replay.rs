//! Fixed-capacity experience replay.
//!
//! Every rollout, evolutionary or gradient, pushes its transitions here;
//! the gradient learners sample uniform mini-batches with replacement.

use crate::error::TrainError;
use rand::Rng;

/// One environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f64>,
    pub next_state: Vec<f64>,
    pub action: Vec<f64>,
    pub reward: f64,
    /// 1.0 only for true termination; 0.0 when the episode was cut at the step limit.
    pub done: f64,
}

/// Destination for transitions produced by a rollout.
pub trait TransitionSink {
    fn record(&mut self, transition: Transition);
}

impl TransitionSink for Vec<Transition> {
    fn record(&mut self, transition: Transition) {
        self.push(transition);
    }
}

/// A sampled mini-batch, one row per transition.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub states: Vec<Vec<f64>>,
    pub next_states: Vec<Vec<f64>>,
    pub actions: Vec<Vec<f64>>,
    pub rewards: Vec<f64>,
    pub dones: Vec<f64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Ring buffer; once full, the oldest transition is overwritten.
#[derive(Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    storage: Vec<Transition>,
    position: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        ReplayBuffer {
            capacity: capacity.max(1),
            storage: Vec::new(),
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn push(&mut self, transition: Transition) {
        if self.storage.len() < self.capacity {
            self.storage.push(transition);
        } else {
            self.storage[self.position] = transition;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    /// Append many transitions in order.
    pub fn extend(&mut self, transitions: impl IntoIterator<Item = Transition>) {
        for t in transitions {
            self.push(t);
        }
    }

    /// Uniform sample with replacement. Fails when fewer than `batch_size`
    /// transitions are stored.
    pub fn sample(&self, batch_size: usize, rng: &mut impl Rng) -> Result<Batch, TrainError> {
        if batch_size == 0 || self.storage.len() < batch_size {
            return Err(TrainError::InsufficientBuffer {
                len: self.storage.len(),
                batch_size,
            });
        }
        let mut batch = Batch {
            states: Vec::with_capacity(batch_size),
            next_states: Vec::with_capacity(batch_size),
            actions: Vec::with_capacity(batch_size),
            rewards: Vec::with_capacity(batch_size),
            dones: Vec::with_capacity(batch_size),
        };
        for _ in 0..batch_size {
            let t = &self.storage[rng.gen_range(0..self.storage.len())];
            batch.states.push(t.state.clone());
            batch.next_states.push(t.next_state.clone());
            batch.actions.push(t.action.clone());
            batch.rewards.push(t.reward);
            batch.dones.push(t.done);
        }
        Ok(batch)
    }
}

impl TransitionSink for ReplayBuffer {
    fn record(&mut self, transition: Transition) {
        self.push(transition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t(r: f64) -> Transition {
        Transition {
            state: vec![r],
            next_state: vec![r + 1.0],
            action: vec![0.0],
            reward: r,
            done: 0.0,
        }
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut buf = ReplayBuffer::new(3);
        buf.extend((0..5).map(|i| t(i as f64)));
        assert_eq!(buf.len(), 3);
        let mut rewards: Vec<f64> = buf.storage.iter().map(|t| t.reward).collect();
        rewards.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sample_requires_batch_size() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut buf = ReplayBuffer::new(10);
        buf.extend((0..4).map(|i| t(i as f64)));
        assert_eq!(
            buf.sample(5, &mut rng).unwrap_err(),
            TrainError::InsufficientBuffer { len: 4, batch_size: 5 }
        );
        let batch = buf.sample(4, &mut rng).unwrap();
        assert_eq!(batch.len(), 4);
        for (s, r) in batch.states.iter().zip(&batch.rewards) {
            assert_eq!(s[0], *r);
        }
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<Transition> = Vec::new();
        sink.record(t(1.0));
        assert_eq!(sink.len(), 1);
    }
}
