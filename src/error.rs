//! Typed errors for the library layer.
//!
//! The binary and the training loop wrap these in `anyhow` with context;
//! the loop matches on `TrainError::InsufficientBuffer` to skip an update.

use thiserror::Error;

/// Errors raised by the evolution engine.
#[derive(Debug, Error, PartialEq)]
pub enum EsError {
    #[error("population has {params} parameter vectors but {fitnesses} fitness values")]
    ShapeMismatch { params: usize, fitnesses: usize },

    #[error("parameter vector has length {got}, engine dimension is {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("antithetic sampling needs an even population size, got {0}")]
    OddPopulation(usize),

    #[error("population size must be positive")]
    EmptyPopulation,
}

/// Errors raised by the gradient learners.
#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    #[error("replay buffer holds {len} transitions, batch needs {batch_size}")]
    InsufficientBuffer { len: usize, batch_size: usize },

    #[error("parameter vector has length {got}, network has {expected} parameters")]
    ParamLength { expected: usize, got: usize },
}

/// Errors raised by environments. These are never recovered.
#[derive(Debug, Error, PartialEq)]
pub enum EnvError {
    #[error("unknown environment: {0}")]
    UnknownEnv(String),

    #[error("action has {got} dimensions, environment expects {expected}")]
    ActionDimension { expected: usize, got: usize },

    #[error("action contains a non-finite value")]
    NonFinite,
}

/// Invalid run configuration, detected before training starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("pop_size must be positive")]
    EmptyPopulation,

    #[error("antithetic sampling needs an even pop_size, got {0}")]
    OddPopulation(usize),

    #[error("parents ({parents}) must be in 1..={pool}")]
    Parents { parents: usize, pool: usize },

    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("{0} must be positive")]
    Zero(&'static str),

    #[error("hidden layer sizes must be non-empty and positive")]
    Hidden,
}
