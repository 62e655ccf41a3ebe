// src/config.rs
// Physics constants plus runtime (server) settings read from the environment.

use std::env;

/// Gravitational acceleration, hardcoded like the rest of the model.
pub const GRAVITY: f64 = 9.81;
/// Fixed timestep: one 60 Hz frame.
pub const DT: f64 = 1.0 / 60.0;
/// Drag coefficient used when the caller does not pick one.
pub const DEFAULT_DRAG_COEFF: f64 = 0.005;
/// End-bob trail length kept by a session; oldest points are dropped first.
pub const TRAIL_CAPACITY: usize = 500;
/// Longest chain a session or batch request accepts.
pub const MAX_LINKS: usize = 64;
/// Upper bound on frames a single HTTP request may advance.
pub const MAX_STEPS_PER_REQUEST: usize = 100_000;

pub fn http_port() -> u16 {
    env::var("PENDULUM_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080)
}

pub fn bind_addr() -> String {
    env::var("PENDULUM_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string())
}

pub fn static_dir() -> String {
    env::var("PENDULUM_STATIC_DIR").unwrap_or_else(|_| "./static".to_string())
}

/// Link count of the shared session at startup. Falls back to 2 when unset or zero.
pub fn default_links() -> usize {
    env::var("PENDULUM_DEFAULT_LINKS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&n| n >= 1)
        .unwrap_or(2)
}
