//! Feed-forward networks over flat parameter vectors.
//!
//! Weights live in one `Vec<f64>`, layer by layer: the `fan_in × fan_out`
//! weight block (row-major) followed by the `fan_out` biases. That flat
//! vector *is* the ParameterVector the evolution engine searches over, so
//! flatten/unflatten is a copy and the ordering is stable by construction.

use crate::error::TrainError;
use rand::Rng;
use rand_distr::StandardNormal;

/// All trainable weights of one network, in layer order.
pub type ParameterVector = Vec<f64>;

/// Anything whose trainable state is a fixed-length real vector.
pub trait Parameterized {
    /// Dimensionality D of the parameter vector.
    fn n_params(&self) -> usize;

    /// Flatten: copy out the current parameters.
    fn get_params(&self) -> ParameterVector;

    /// Unflatten: overwrite the parameters. Fails if `params.len() != D`.
    fn set_params(&mut self, params: &[f64]) -> Result<(), TrainError>;
}

/// A deterministic controller: observation in, action out.
pub trait Policy: Parameterized + Sync {
    fn action_dim(&self) -> usize;

    fn act(&self, obs: &[f64]) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Identity,
    Relu,
    Tanh,
}

impl Activation {
    fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Identity => z,
            Activation::Relu => z.max(0.0),
            Activation::Tanh => z.tanh(),
        }
    }

    /// Derivative w.r.t. the pre-activation, given pre- and post-activation.
    fn derivative(self, z: f64, a: f64) -> f64 {
        match self {
            Activation::Identity => 1.0,
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - a * a,
        }
    }
}

/// Intermediate values of one forward pass, kept for backprop.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub output: Vec<f64>,
    /// Input to each layer (index 0 is the network input).
    inputs: Vec<Vec<f64>>,
    /// z = xW + b for each layer.
    pre_activations: Vec<Vec<f64>>,
}

/// Multi-layer perceptron with one activation for hidden layers and one for the output.
#[derive(Debug, Clone)]
pub struct Mlp {
    layer_dims: Vec<(usize, usize)>,
    hidden_activation: Activation,
    output_activation: Activation,
    params: Vec<f64>,
}

impl Mlp {
    /// Xavier-initialised network. Biases start at zero.
    pub fn new(
        input: usize,
        output: usize,
        hidden: &[usize],
        hidden_activation: Activation,
        output_activation: Activation,
        rng: &mut impl Rng,
    ) -> Self {
        let mut dims = Vec::with_capacity(hidden.len() + 1);
        let mut prev = input;
        for &h in hidden {
            dims.push((prev, h));
            prev = h;
        }
        dims.push((prev, output));

        let n_params: usize = dims.iter().map(|(i, o)| i * o + o).sum();
        let mut params = Vec::with_capacity(n_params);
        for &(fan_in, fan_out) in &dims {
            let std = (2.0 / (fan_in + fan_out) as f64).sqrt();
            params.extend((0..fan_in * fan_out).map(|_| rng.sample::<f64, _>(StandardNormal) * std));
            params.extend(std::iter::repeat(0.0).take(fan_out));
        }

        Mlp {
            layer_dims: dims,
            hidden_activation,
            output_activation,
            params,
        }
    }

    pub fn layer_dims(&self) -> &[(usize, usize)] {
        &self.layer_dims
    }

    pub fn input_dim(&self) -> usize {
        self.layer_dims[0].0
    }

    pub fn output_dim(&self) -> usize {
        self.layer_dims[self.layer_dims.len() - 1].1
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f64] {
        &mut self.params
    }

    fn activation(&self, layer_idx: usize) -> Activation {
        if layer_idx + 1 == self.layer_dims.len() {
            self.output_activation
        } else {
            self.hidden_activation
        }
    }

    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.forward_cached(x).output
    }

    /// Forward pass keeping every layer's input and pre-activation.
    pub fn forward_cached(&self, x: &[f64]) -> ForwardPass {
        debug_assert_eq!(x.len(), self.input_dim());
        let mut inputs = Vec::with_capacity(self.layer_dims.len());
        let mut pre_activations = Vec::with_capacity(self.layer_dims.len());
        let mut x = x.to_vec();
        let mut offset = 0;

        for (layer_idx, &(fan_in, fan_out)) in self.layer_dims.iter().enumerate() {
            let w = &self.params[offset..offset + fan_in * fan_out];
            offset += fan_in * fan_out;
            let b = &self.params[offset..offset + fan_out];
            offset += fan_out;

            // z = x @ W + b
            let mut z = b.to_vec();
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let row = &w[i * fan_out..(i + 1) * fan_out];
                for (zj, &wij) in z.iter_mut().zip(row) {
                    *zj += xi * wij;
                }
            }

            let act = self.activation(layer_idx);
            let a: Vec<f64> = z.iter().map(|&v| act.apply(v)).collect();
            inputs.push(x);
            pre_activations.push(z);
            x = a;
        }

        ForwardPass {
            output: x,
            inputs,
            pre_activations,
        }
    }

    /// Backward pass. Adds dL/dθ into `grad` (same layout as the params)
    /// and returns dL/dx for the network input.
    pub fn backward(&self, fwd: &ForwardPass, d_output: &[f64], grad: &mut [f64]) -> Vec<f64> {
        debug_assert_eq!(grad.len(), self.params.len());
        let n_layers = self.layer_dims.len();

        // Start offset of each layer's weight block
        let mut offsets = Vec::with_capacity(n_layers);
        let mut offset = 0;
        for &(fan_in, fan_out) in &self.layer_dims {
            offsets.push(offset);
            offset += fan_in * fan_out + fan_out;
        }

        let mut delta = d_output.to_vec();
        for layer_idx in (0..n_layers).rev() {
            let (fan_in, fan_out) = self.layer_dims[layer_idx];
            let act = self.activation(layer_idx);
            let z = &fwd.pre_activations[layer_idx];
            let a_out = if layer_idx + 1 == n_layers {
                &fwd.output
            } else {
                &fwd.inputs[layer_idx + 1]
            };
            for j in 0..fan_out {
                delta[j] *= act.derivative(z[j], a_out[j]);
            }

            let w_off = offsets[layer_idx];
            let b_off = w_off + fan_in * fan_out;
            let a_prev = &fwd.inputs[layer_idx];

            // dL/dW = a_prev^T @ delta, dL/db = delta
            for i in 0..fan_in {
                if a_prev[i] == 0.0 {
                    continue;
                }
                let row = &mut grad[w_off + i * fan_out..w_off + (i + 1) * fan_out];
                for (g, &d) in row.iter_mut().zip(&delta) {
                    *g += a_prev[i] * d;
                }
            }
            for (g, &d) in grad[b_off..b_off + fan_out].iter_mut().zip(&delta) {
                *g += d;
            }

            // delta_prev = delta @ W^T
            let w = &self.params[w_off..b_off];
            delta = (0..fan_in)
                .map(|i| {
                    w[i * fan_out..(i + 1) * fan_out]
                        .iter()
                        .zip(&delta)
                        .map(|(wij, d)| wij * d)
                        .sum()
                })
                .collect();
        }
        delta
    }
}

impl Parameterized for Mlp {
    fn n_params(&self) -> usize {
        self.params.len()
    }

    fn get_params(&self) -> ParameterVector {
        self.params.clone()
    }

    fn set_params(&mut self, params: &[f64]) -> Result<(), TrainError> {
        if params.len() != self.params.len() {
            return Err(TrainError::ParamLength {
                expected: self.params.len(),
                got: params.len(),
            });
        }
        self.params.copy_from_slice(params);
        Ok(())
    }
}

/// Polyak blend: `target <- tau * source + (1 - tau) * target`.
pub fn soft_update(target: &mut [f64], source: &[f64], tau: f64) {
    debug_assert_eq!(target.len(), source.len());
    for (t, &s) in target.iter_mut().zip(source) {
        *t = tau * s + (1.0 - tau) * *t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net(seed: u64) -> Mlp {
        let mut rng = StdRng::seed_from_u64(seed);
        Mlp::new(3, 2, &[5, 4], Activation::Tanh, Activation::Identity, &mut rng)
    }

    #[test]
    fn test_param_count() {
        // 8→64→32→4 = (8*64+64) + (64*32+32) + (32*4+4) = 576+2080+132 = 2788
        let mut rng = StdRng::seed_from_u64(0);
        let p = Mlp::new(8, 4, &[64, 32], Activation::Relu, Activation::Tanh, &mut rng);
        assert_eq!(p.n_params(), 2788);
    }

    #[test]
    fn test_flatten_roundtrip_preserves_behaviour() {
        let a = net(1);
        let mut b = net(2);
        let x = [0.3, -0.7, 1.1];
        assert_ne!(a.forward(&x), b.forward(&x));
        b.set_params(&a.get_params()).unwrap();
        assert_eq!(a.forward(&x), b.forward(&x));
        assert_eq!(b.get_params(), a.get_params());
    }

    #[test]
    fn test_set_params_rejects_wrong_length() {
        let mut a = net(1);
        let err = a.set_params(&[0.0; 3]).unwrap_err();
        assert_eq!(err, TrainError::ParamLength { expected: a.n_params(), got: 3 });
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let a = net(7);
        let x = [0.4, -0.2, 0.9];
        // L = sum(output * c)
        let c = [0.7, -1.3];
        let loss = |m: &Mlp| -> f64 { m.forward(&x).iter().zip(&c).map(|(o, c)| o * c).sum() };

        let fwd = a.forward_cached(&x);
        let mut grad = vec![0.0; a.n_params()];
        let d_input = a.backward(&fwd, &c, &mut grad);

        let eps = 1e-6;
        for k in [0, 7, 19, a.n_params() - 1] {
            let mut plus = a.clone();
            plus.params_mut()[k] += eps;
            let mut minus = a.clone();
            minus.params_mut()[k] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - grad[k]).abs() < 1e-6, "param {k}: {numeric} vs {}", grad[k]);
        }

        for i in 0..3 {
            let mut xp = x;
            xp[i] += eps;
            let mut xm = x;
            xm[i] -= eps;
            let f = |x: &[f64]| -> f64 { a.forward(x).iter().zip(&c).map(|(o, c)| o * c).sum() };
            let numeric = (f(&xp[..]) - f(&xm[..])) / (2.0 * eps);
            assert!((numeric - d_input[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_soft_update() {
        let mut t = vec![0.0, 10.0];
        soft_update(&mut t, &[1.0, 0.0], 0.25);
        assert_eq!(t, vec![0.25, 7.5]);
    }
}
