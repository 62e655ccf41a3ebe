// src/math.rs
// Kinematics pass and the per-link torque terms of the approximate chain model.
// Positions are a running sum over the chain: every link's absolute angle displaces the
// end effector directly (x += L sin θ, y += L cos θ), with y growing downward from the anchor.
// Velocities use the same running sum of L ω (cos θ, -sin θ); this is an approximation,
// not the time derivative of the position chain.
// The torque model is per link: gravity on the bob plus a coupling term that only acts on
// link 1 (parent acceleration -g), zero for every deeper link. No mass matrix, no recursion.

use crate::config::GRAVITY;
use crate::model::{Chain, Link};
use serde::Serialize;

/// Running position and velocity of one bob, relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BobState {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

impl BobState {
    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

/// Forward kinematics over the whole chain; entry i is the bob of link i.
pub fn kinematics(chain: &Chain) -> Vec<BobState> {
    let mut acc = BobState::default(); // Anchor at origin, at rest.
    chain
        .links()
        .iter()
        .map(|link| {
            let (sin, cos) = link.angle().sin_cos();
            let lw = link.length() * link.angular_velocity();
            acc.x += link.length() * sin;
            acc.y += link.length() * cos;
            acc.vx += lw * cos;
            acc.vy += -lw * sin;
            acc
        })
        .collect()
}

/// Bob positions only, as (x, y). Used for trails and plots.
pub fn bob_positions(chain: &Chain) -> Vec<(f64, f64)> {
    let mut x = 0.0;
    let mut y = 0.0;
    chain
        .links()
        .iter()
        .map(|link| {
            x += link.length() * link.angle().sin();
            y += link.length() * link.angle().cos();
            (x, y)
        })
        .collect()
}

/// τ = -g m L sin θ.
pub fn gravity_torque(link: &Link) -> f64 {
    -GRAVITY * link.mass() * link.length() * link.angle().sin()
}

/// Coupling from the parent link. Only link 1 sees a parent acceleration (-g);
/// link 0 has no parent and links 2.. get zero.
pub fn coupling_torque(index: usize, link: &Link, parent: Option<&Link>) -> f64 {
    let Some(parent) = parent else {
        return 0.0;
    };
    let parent_accel = if index == 1 { -GRAVITY } else { 0.0 };
    parent_accel * link.mass() * link.length() * (link.angle() - parent.angle()).sin()
}

/// Point mass at radius L: I = m L².
pub fn moment_of_inertia(link: &Link) -> f64 {
    link.mass() * link.length() * link.length()
}
