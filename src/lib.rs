// src/lib.rs
// Compound (n-link) pendulum: approximate per-link torque model, explicit Euler stepping,
// energy accounting, and an actix-web front end that owns a running session.

pub mod config;
pub mod error;
pub mod logic;
pub mod math;
pub mod model;
pub mod ui;

pub use error::PendulumError;
pub use logic::{step, Energy, Frame, Simulation, Snapshot, StepOutcome};
pub use model::{create_default_chain, Chain, Link};
