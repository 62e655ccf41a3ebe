// src/logic.rs
// Per-frame stepping of the chain and the host-side session that drives it.
// `step` is pure: (chain, drag flag, drag coefficient) -> (next chain, energy snapshot).
// It runs kinematics (pre-step state), then updates every link from that same snapshot, then
// accounts energy with post-step angles but pre-step velocities.
// Integration is explicit Euler with a fixed dt: ω' = ω + α dt, θ' = θ + ω dt, where the
// angle update uses the OLD ω. Changing that order changes trajectories.
// `Simulation` owns everything `step` must not: the current chain, cumulative drag work,
// the end-bob trail, and drag settings.

use crate::config::{DEFAULT_DRAG_COEFF, DT, GRAVITY, MAX_LINKS, TRAIL_CAPACITY};
use crate::error::{PendulumError, Result};
use crate::math::{
    bob_positions, coupling_torque, gravity_torque, kinematics, moment_of_inertia, BobState,
};
use crate::model::{create_default_chain, Chain};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// Energy bookkeeping for one step. `work_drag` is this step's contribution only,
/// unless the value comes from a `Simulation`, which reports its running total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Energy {
    pub kinetic: f64,
    pub potential: f64,
    pub work_drag: f64,
}

impl Energy {
    /// Kinetic plus potential.
    pub fn mechanical(&self) -> f64 {
        self.kinetic + self.potential
    }
}

/// Result of one `step`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub chain: Chain,
    pub energy: Energy,
}

fn check_drag_coeff(drag_coeff: f64) -> Result<()> {
    if drag_coeff.is_finite() && drag_coeff >= 0.0 {
        Ok(())
    } else {
        Err(PendulumError::invalid_parameter(format!(
            "drag coefficient must be finite and >= 0, got {drag_coeff}"
        )))
    }
}

/// Advances every link by one fixed frame. Returns the new chain and this step's energy.
/// With `use_drag`, a torque -c ω opposes each link's rotation and its work (always <= 0)
/// is summed into `work_drag`.
/// Fails if the step would produce a non-finite angle, angular velocity, or energy.
pub fn step(chain: &Chain, use_drag: bool, drag_coeff: f64) -> Result<StepOutcome> {
    check_drag_coeff(drag_coeff)?;

    let pre_step = kinematics(chain); // Velocities are reused by the energy pass.
    let links = chain.links();
    let mut work_drag = 0.0;

    let next = chain.map_links(|(i, link)| {
        let parent = i.checked_sub(1).map(|p| &links[p]);
        let torque = gravity_torque(link) + coupling_torque(i, link, parent);
        let inertia = moment_of_inertia(link);
        let mut alpha = torque / inertia;

        let omega = link.angular_velocity();
        if use_drag {
            let drag_torque = -drag_coeff * omega;
            alpha += drag_torque / inertia;
            work_drag += drag_torque * omega * DT;
        }

        link.with_state(link.angle() + omega * DT, omega + alpha * DT)
    });

    let (kinetic, potential) = account_energy(&next, &pre_step);
    let diverged = next
        .links()
        .iter()
        .any(|l| !l.angle().is_finite() || !l.angular_velocity().is_finite());
    if diverged || !kinetic.is_finite() || !potential.is_finite() || !work_drag.is_finite() {
        return Err(PendulumError::invalid_chain(
            "state left the finite range during the step",
        ));
    }
    Ok(StepOutcome {
        chain: next,
        energy: Energy {
            kinetic,
            potential,
            work_drag,
        },
    })
}

/// Kinetic and potential energy of `next`, using its angles for height and the
/// pre-step bob velocities for speed. Potential is reported as -Σ m g y since y points down.
fn account_energy(next: &Chain, pre_step: &[BobState]) -> (f64, f64) {
    let mut kinetic = 0.0;
    let mut potential = 0.0;
    let mut y = 0.0;
    for (link, bob) in next.links().iter().zip(pre_step) {
        y += link.length() * link.angle().cos();
        let speed = bob.speed();
        kinetic += 0.5 * link.mass() * speed * speed;
        potential += link.mass() * GRAVITY * y;
    }
    (kinetic, -potential)
}

/// One recorded frame of a session run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub time: f64,
    pub energy: Energy,
    pub positions: Vec<(f64, f64)>,
}

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub links: Chain,
    pub energy: Energy,
    pub use_drag: bool,
    pub drag_coeff: f64,
    pub frames: u64,
    pub time: f64,
    pub trail: Vec<(f64, f64)>,
}

/// Host-side owner of a pendulum: chain, drag settings, cumulative drag work and trail.
#[derive(Debug, Clone)]
pub struct Simulation {
    chain: Chain,
    use_drag: bool,
    drag_coeff: f64,
    work_drag_total: f64,
    energy: Energy,
    frames: u64,
    trail: VecDeque<(f64, f64)>,
}

impl Simulation {
    /// Default chain of `n` links, drag off.
    pub fn new(n: usize) -> Result<Self> {
        Ok(Self::from_chain(create_default_chain(n)?))
    }

    pub fn from_chain(chain: Chain) -> Self {
        Self {
            chain,
            use_drag: false,
            drag_coeff: DEFAULT_DRAG_COEFF,
            work_drag_total: 0.0,
            energy: Energy::default(),
            frames: 0,
            trail: VecDeque::with_capacity(TRAIL_CAPACITY),
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Latest energy; `work_drag` holds the running total since the last reset.
    pub fn energy(&self) -> Energy {
        self.energy
    }

    pub fn work_drag_total(&self) -> f64 {
        self.work_drag_total
    }

    pub fn trail(&self) -> &VecDeque<(f64, f64)> {
        &self.trail
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn time(&self) -> f64 {
        self.frames as f64 * DT
    }

    pub fn use_drag(&self) -> bool {
        self.use_drag
    }

    pub fn drag_coeff(&self) -> f64 {
        self.drag_coeff
    }

    pub fn set_drag(&mut self, enabled: bool, coeff: Option<f64>) -> Result<()> {
        let coeff = coeff.unwrap_or(self.drag_coeff);
        check_drag_coeff(coeff)?;
        self.use_drag = enabled;
        self.drag_coeff = coeff;
        debug!(enabled, coeff, "drag updated");
        Ok(())
    }

    /// Steps once and records the frame.
    pub fn advance(&mut self) -> Result<Frame> {
        let StepOutcome { chain, energy } = step(&self.chain, self.use_drag, self.drag_coeff)?;
        self.chain = chain;
        self.work_drag_total += energy.work_drag;
        self.energy = Energy {
            work_drag: self.work_drag_total,
            ..energy
        };
        self.frames += 1;

        let positions = bob_positions(&self.chain);
        if let Some(&end) = positions.last() {
            if self.trail.len() == TRAIL_CAPACITY {
                self.trail.pop_front();
            }
            self.trail.push_back(end);
        }

        Ok(Frame {
            time: self.time(),
            energy: self.energy,
            positions,
        })
    }

    /// Advances `frames` times without keeping the per-frame records.
    pub fn advance_by(&mut self, frames: usize) -> Result<()> {
        for _ in 0..frames {
            self.advance()?;
        }
        Ok(())
    }

    /// Advances `frames` times, returning every frame in order.
    pub fn run(&mut self, frames: usize) -> Result<Vec<Frame>> {
        (0..frames).map(|_| self.advance()).collect()
    }

    /// Fresh default chain with the current link count; clears trail, time and drag work.
    /// Fails (leaving the session as it was) when the default formula can't build that many links.
    pub fn reset(&mut self) -> Result<()> {
        let chain = create_default_chain(self.chain.len())?;
        self.chain = chain;
        self.work_drag_total = 0.0;
        self.energy = Energy::default();
        self.frames = 0;
        self.trail.clear();
        debug!(links = self.chain.len(), "session reset");
        Ok(())
    }

    /// Appends a default link; refused once the chain holds `MAX_LINKS`.
    pub fn add_link(&mut self) -> Result<()> {
        if self.chain.len() >= MAX_LINKS {
            return Err(PendulumError::invalid_parameter(format!(
                "chain already has the maximum of {MAX_LINKS} links"
            )));
        }
        self.chain.append_link();
        debug!(links = self.chain.len(), "link appended");
        Ok(())
    }

    /// Returns false when the chain is already down to one link.
    pub fn remove_link(&mut self) -> bool {
        let removed = self.chain.remove_tail();
        debug!(links = self.chain.len(), removed, "remove link");
        removed
    }

    /// Applies mass and/or length to one link. Both are validated before either is written.
    pub fn update_link(
        &mut self,
        index: usize,
        mass: Option<f64>,
        length: Option<f64>,
    ) -> Result<()> {
        let mut edited = self.chain.clone();
        if let Some(mass) = mass {
            edited.set_mass(index, mass)?;
        }
        if let Some(length) = length {
            edited.set_length(index, length)?;
        }
        self.chain = edited;
        debug!(index, ?mass, ?length, "link updated");
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            links: self.chain.clone(),
            energy: self.energy,
            use_drag: self.use_drag,
            drag_coeff: self.drag_coeff,
            frames: self.frames,
            time: self.time(),
            trail: self.trail.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Link;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::FRAC_PI_2;

    fn single(angle: f64, omega: f64) -> Chain {
        Chain::from_links(vec![Link::new(100.0, 10.0, angle, omega).unwrap()]).unwrap()
    }

    #[test]
    fn first_step_of_default_chain() {
        let chain = create_default_chain(2).unwrap();
        let out = step(&chain, false, DEFAULT_DRAG_COEFF).unwrap();
        let links = out.chain.links();

        // Angles move with the old (zero) velocity.
        assert_eq!(links[0].angle(), FRAC_PI_2);
        assert_eq!(links[1].angle(), FRAC_PI_2 + 0.2);

        // α0 = -g sin θ / L.
        assert_relative_eq!(links[0].angular_velocity(), -9.81 / 100.0 * DT, epsilon = 1e-12);
        // α1 adds the -g coupling against link 0.
        let theta1 = FRAC_PI_2 + 0.2;
        let alpha1 = (-9.81 * theta1.sin() - 9.81 * (theta1 - FRAC_PI_2).sin()) / 90.0;
        assert_relative_eq!(links[1].angular_velocity(), alpha1 * DT, epsilon = 1e-12);

        assert_eq!(out.energy.kinetic, 0.0);
        assert_eq!(out.energy.work_drag, 0.0);
        let y0 = 100.0 * FRAC_PI_2.cos();
        let y1 = y0 + 90.0 * theta1.cos();
        assert_relative_eq!(
            out.energy.potential,
            -(10.0 * 9.81 * y0 + 10.0 * 9.81 * y1),
            epsilon = 1e-9
        );
    }

    #[test]
    fn links_update_from_pre_step_snapshot() {
        let chain = Chain::from_links(vec![
            Link::new(100.0, 10.0, 0.5, 3.0).unwrap(),
            Link::new(90.0, 10.0, 1.0, 0.0).unwrap(),
        ])
        .unwrap();
        let out = step(&chain, false, 0.0).unwrap();
        let links = out.chain.links();

        // Link 0 moved, but link 1's coupling still sees its old angle.
        assert_relative_eq!(links[0].angle(), 0.5 + 3.0 * DT);
        let alpha1 = (-GRAVITY * 1.0f64.sin() - GRAVITY * (1.0f64 - 0.5).sin()) / 90.0;
        assert_relative_eq!(links[1].angular_velocity(), alpha1 * DT, epsilon = 1e-12);
        assert_eq!(links[1].angle(), 1.0);
    }

    #[test]
    fn step_rejects_overflowing_state() {
        let chain = single(0.0, 1e200);
        assert!(matches!(
            step(&chain, false, 0.0),
            Err(PendulumError::InvalidChain(_))
        ));
    }

    #[test]
    fn angle_update_uses_old_velocity() {
        let chain = single(0.3, 2.0);
        let out = step(&chain, false, 0.0).unwrap();
        let link = out.chain.links()[0];
        assert_relative_eq!(link.angle(), 0.3 + 2.0 * DT);
        assert_relative_eq!(
            link.angular_velocity(),
            2.0 - 9.81 * 0.3f64.sin() / 100.0 * DT,
            epsilon = 1e-12
        );
    }

    #[test]
    fn kinetic_energy_uses_pre_step_velocity() {
        let chain = single(0.0, 1.5);
        let out = step(&chain, false, 0.0).unwrap();
        assert_relative_eq!(out.energy.kinetic, 0.5 * 10.0 * (100.0f64 * 1.5).powi(2));
        assert_relative_eq!(
            out.energy.potential,
            -10.0 * 9.81 * 100.0 * (1.5 * DT).cos(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn drag_work_per_step() {
        let chain = single(0.0, 2.0);
        let out = step(&chain, true, 0.5).unwrap();
        assert_relative_eq!(out.energy.work_drag, -0.5 * 2.0 * 2.0 * DT, epsilon = 1e-12);
        let undragged = step(&chain, false, 0.5).unwrap();
        assert!(
            out.chain.links()[0].angular_velocity()
                < undragged.chain.links()[0].angular_velocity()
        );
    }

    #[test]
    fn rejects_bad_drag_coefficient() {
        let chain = single(1.0, 0.0);
        for coeff in [-0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                step(&chain, true, coeff),
                Err(PendulumError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn session_accumulates_drag_work() {
        let mut sim = Simulation::from_chain(single(FRAC_PI_2, 0.0));
        sim.set_drag(true, Some(0.5)).unwrap();
        let frames = sim.run(50).unwrap();
        let summed: f64 = {
            let mut replay = single(FRAC_PI_2, 0.0);
            let mut total = 0.0;
            for _ in 0..50 {
                let out = step(&replay, true, 0.5).unwrap();
                total += out.energy.work_drag;
                replay = out.chain;
            }
            total
        };
        assert_eq!(frames.len(), 50);
        assert_relative_eq!(sim.work_drag_total(), summed);
        assert_eq!(sim.energy().work_drag, sim.work_drag_total());
        assert_abs_diff_eq!(frames[49].time, 50.0 * DT, epsilon = 1e-12);
    }

    #[test]
    fn trail_is_bounded() {
        let mut sim = Simulation::new(2).unwrap();
        sim.run(TRAIL_CAPACITY + 20).unwrap();
        assert_eq!(sim.trail().len(), TRAIL_CAPACITY);
        let end = *bob_positions(sim.chain()).last().unwrap();
        assert_eq!(*sim.trail().back().unwrap(), end);
    }

    #[test]
    fn reset_restores_defaults_and_clears_history() {
        let mut sim = Simulation::new(3).unwrap();
        sim.set_drag(true, None).unwrap();
        sim.run(10).unwrap();
        sim.reset().unwrap();
        assert_eq!(sim.chain(), &create_default_chain(3).unwrap());
        assert!(sim.trail().is_empty());
        assert_eq!(sim.frames(), 0);
        assert_eq!(sim.work_drag_total(), 0.0);
        assert!(sim.use_drag());
    }

    #[test]
    fn reset_fails_cleanly_for_long_chains() {
        let mut sim = Simulation::new(10).unwrap();
        sim.add_link().unwrap();
        let before = sim.chain().clone();
        assert!(sim.reset().is_err());
        assert_eq!(sim.chain(), &before);
    }

    #[test]
    fn add_link_stops_at_cap() {
        let mut sim = Simulation::new(1).unwrap();
        for _ in 1..MAX_LINKS {
            sim.add_link().unwrap();
        }
        assert_eq!(sim.chain().len(), MAX_LINKS);
        assert!(matches!(
            sim.add_link(),
            Err(PendulumError::InvalidParameter(_))
        ));
        assert_eq!(sim.chain().len(), MAX_LINKS);
    }

    #[test]
    fn advance_by_matches_run() {
        let mut a = Simulation::new(3).unwrap();
        let mut b = a.clone();
        a.advance_by(40).unwrap();
        b.run(40).unwrap();
        assert_eq!(a.chain(), b.chain());
        assert_eq!(a.frames(), 40);
        assert_eq!(a.trail(), b.trail());
    }

    #[test]
    fn update_link_is_atomic() {
        let mut sim = Simulation::new(2).unwrap();
        let before = sim.chain().clone();
        assert!(sim.update_link(0, Some(5.0), Some(0.0)).is_err());
        assert_eq!(sim.chain(), &before);
        sim.update_link(0, Some(5.0), Some(70.0)).unwrap();
        assert_eq!(sim.chain().links()[0].mass(), 5.0);
        assert_eq!(sim.chain().links()[0].length(), 70.0);
    }

    #[test]
    fn set_drag_rejects_negative() {
        let mut sim = Simulation::new(1).unwrap();
        assert!(sim.set_drag(true, Some(-1.0)).is_err());
        assert!(!sim.use_drag());
        assert_eq!(sim.drag_coeff(), DEFAULT_DRAG_COEFF);
    }
}
