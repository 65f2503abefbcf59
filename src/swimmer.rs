//! Three-link swimmer in a viscous plane, MuJoCo Swimmer style.
//!
//! The observation is the heading, both joint angles, the planar velocity of
//! the body, the heading rate and both joint rates (8 values). The two
//! actions are joint torques in [-1, 1]. The reward is forward speed minus a
//! small control cost. Episodes never terminate and are cut at 1000 steps.

use crate::env::{EnvConfig, Environment, StepResult};
use crate::error::EnvError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LINKS: usize = 3;
const JOINTS: usize = LINKS - 1;
const LINK_LEN: f64 = 0.1;
const LINK_MASS: f64 = 1.0;
/// Rod about its centre: m L² / 12.
const LINK_INERTIA: f64 = LINK_MASS * LINK_LEN * LINK_LEN / 12.0;
const VISCOSITY: f64 = 0.1;
/// Drag across a link relative to drag along it.
const NORMAL_DRAG_RATIO: f64 = 5.0;
const JOINT_LIMIT: f64 = 1.5;
const DT: f64 = 0.01;
const SUBSTEPS: usize = 4;
const HORIZON: usize = 1000;
const CTRL_COST: f64 = 1e-4;

pub struct Swimmer {
    config: EnvConfig,
    pos: [f64; 2],
    vel: [f64; 2],
    heading: f64,
    heading_rate: f64,
    joints: [f64; JOINTS],
    joint_rates: [f64; JOINTS],
    t: usize,
    rng: StdRng,
}

impl Swimmer {
    pub fn new(seed: Option<u64>) -> Self {
        let mut env = Swimmer {
            config: EnvConfig {
                name: "Swimmer-v1".to_string(),
                obs_dim: 2 + 2 * JOINTS + 2,
                action_dim: JOINTS,
                max_action: 1.0,
                max_steps: HORIZON,
            },
            pos: [0.0; 2],
            vel: [0.0; 2],
            heading: 0.0,
            heading_rate: 0.0,
            joints: [0.0; JOINTS],
            joint_rates: [0.0; JOINTS],
            t: 0,
            rng: StdRng::seed_from_u64(seed.unwrap_or(0)),
        };
        env.reset(None);
        env
    }

    fn observe(&self) -> Vec<f64> {
        let mut obs = Vec::with_capacity(self.config.obs_dim);
        obs.push(self.heading);
        obs.extend_from_slice(&self.joints);
        obs.extend_from_slice(&self.vel);
        obs.push(self.heading_rate);
        obs.extend_from_slice(&self.joint_rates);
        obs
    }

    /// World-frame orientation and angular rate of every link.
    fn links(&self) -> [(f64, f64); LINKS] {
        let mut links = [(self.heading, self.heading_rate); LINKS];
        for j in 0..JOINTS {
            let (angle, rate) = links[j];
            links[j + 1] = (angle + self.joints[j], rate + self.joint_rates[j]);
        }
        links
    }

    fn integrate(&mut self, torque: &[f64; JOINTS]) {
        let mut force = [0.0; 2];
        let mut drag_torque = 0.0;
        for (angle, rate) in self.links() {
            let (s, c) = angle.sin_cos();
            let along = self.vel[0] * c + self.vel[1] * s;
            let across = self.vel[1] * c - self.vel[0] * s;
            let f_along = -VISCOSITY * LINK_LEN * along;
            let f_across = -VISCOSITY * LINK_LEN * NORMAL_DRAG_RATIO * across;
            force[0] += f_along * c - f_across * s;
            force[1] += f_along * s + f_across * c;
            drag_torque -= 2.0 * VISCOSITY * LINK_LEN * LINK_LEN * rate;
        }

        let mass = LINK_MASS * LINKS as f64;
        let inertia = LINK_INERTIA * LINKS as f64;
        // reaction of both joint motors on the head link
        let heading_acc = (drag_torque - torque.iter().sum::<f64>()) / inertia;

        for k in 0..2 {
            self.vel[k] += force[k] / mass * DT;
            self.pos[k] += self.vel[k] * DT;
        }
        self.heading_rate += heading_acc * DT;
        self.heading += self.heading_rate * DT;

        for j in 0..JOINTS {
            let acc = (torque[j] - VISCOSITY * LINK_LEN * self.joint_rates[j]) / LINK_INERTIA;
            self.joint_rates[j] += acc * DT;
            self.joints[j] = (self.joints[j] + self.joint_rates[j] * DT).clamp(-JOINT_LIMIT, JOINT_LIMIT);
        }
    }
}

impl Environment for Swimmer {
    fn reset(&mut self, seed: Option<u64>) -> Vec<f64> {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }
        self.pos = [0.0; 2];
        self.vel = [0.0; 2];
        self.heading = self.rng.gen_range(-0.1..0.1);
        self.heading_rate = 0.0;
        for q in self.joints.iter_mut() {
            *q = self.rng.gen_range(-0.1..0.1);
        }
        self.joint_rates = [0.0; JOINTS];
        self.t = 0;
        self.observe()
    }

    fn step(&mut self, action: &[f64]) -> Result<StepResult, EnvError> {
        self.config.check_action(action)?;
        let mut torque = [0.0; JOINTS];
        for (t, a) in torque.iter_mut().zip(action) {
            *t = a.clamp(-1.0, 1.0);
        }

        let start_x = self.pos[0];
        for _ in 0..SUBSTEPS {
            self.integrate(&torque);
        }
        self.t += 1;

        let speed = (self.pos[0] - start_x) / (DT * SUBSTEPS as f64);
        let effort: f64 = torque.iter().map(|t| t * t).sum();
        Ok(StepResult {
            observation: self.observe(),
            reward: speed - CTRL_COST * effort,
            terminated: false,
            truncated: self.t >= HORIZON,
        })
    }

    fn config(&self) -> &EnvConfig {
        &self.config
    }

    fn steps(&self) -> usize {
        self.t
    }
}
