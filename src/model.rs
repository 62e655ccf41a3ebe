// src/model.rs
// Link state model: the per-link record, the ordered chain that owns the links, and the
// edits a host may apply between frames (append, remove tail, change mass/length).
// Length and mass are private so a Link can only exist with both strictly positive;
// that keeps the torque/inertia math in math.rs free of division-by-zero.
// Angles are absolute (measured from the downward vertical), never relative to the parent.

use crate::error::{PendulumError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Mass given to every default or appended link.
pub const DEFAULT_MASS: f64 = 10.0;
/// Length of link 0 in a default chain; each following link is 10 shorter.
pub const BASE_LENGTH: f64 = 100.0;
/// Appended links never get shorter than this.
pub const MIN_APPENDED_LENGTH: f64 = 50.0;

fn check_positive(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PendulumError::invalid_chain(format!(
            "{what} must be a finite value > 0, got {value}"
        )))
    }
}

fn check_finite(what: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PendulumError::invalid_chain(format!(
            "{what} must be finite, got {value}"
        )))
    }
}

/// One rigid segment with a point mass at its bob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LinkSpec")]
pub struct Link {
    length: f64,
    mass: f64,
    angle: f64,
    angular_velocity: f64,
}

/// Unchecked wire form of a Link; goes through `Link::new` on deserialization.
#[derive(Deserialize)]
struct LinkSpec {
    length: f64,
    mass: f64,
    #[serde(default)]
    angle: f64,
    #[serde(default)]
    angular_velocity: f64,
}

impl TryFrom<LinkSpec> for Link {
    type Error = PendulumError;

    fn try_from(spec: LinkSpec) -> Result<Self> {
        Link::new(spec.length, spec.mass, spec.angle, spec.angular_velocity)
    }
}

impl Link {
    /// Builds a link, rejecting non-positive length/mass and non-finite state.
    pub fn new(length: f64, mass: f64, angle: f64, angular_velocity: f64) -> Result<Self> {
        check_positive("length", length)?;
        check_positive("mass", mass)?;
        check_finite("angle", angle)?;
        check_finite("angular velocity", angular_velocity)?;
        Ok(Self {
            length,
            mass,
            angle,
            angular_velocity,
        })
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Absolute angle from the downward vertical, radians.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    /// Same length and mass, new angular state. Used by the integrator.
    pub(crate) fn with_state(&self, angle: f64, angular_velocity: f64) -> Self {
        Self {
            angle,
            angular_velocity,
            ..*self
        }
    }
}

/// Ordered links; index 0 hangs from the fixed anchor, link i from the bob of link i-1.
/// Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Link>", into = "Vec<Link>")]
pub struct Chain {
    links: Vec<Link>,
}

impl TryFrom<Vec<Link>> for Chain {
    type Error = PendulumError;

    fn try_from(links: Vec<Link>) -> Result<Self> {
        Chain::from_links(links)
    }
}

impl From<Chain> for Vec<Link> {
    fn from(chain: Chain) -> Self {
        chain.links
    }
}

/// Default chain: link i gets length 100 - 10i, mass 10, angle π/2 + 0.2i, at rest.
/// n must be at least 1; n >= 11 would give link 10 a zero length and is rejected.
pub fn create_default_chain(n: usize) -> Result<Chain> {
    if n < 1 {
        return Err(PendulumError::invalid_parameter(
            "a chain needs at least one link",
        ));
    }
    let links = (0..n)
        .map(|i| {
            let i = i as f64;
            Link::new(BASE_LENGTH - 10.0 * i, DEFAULT_MASS, FRAC_PI_2 + 0.2 * i, 0.0)
        })
        .collect::<Result<Vec<_>>>()
        .map_err(|e| {
            PendulumError::invalid_chain(format!("default chain of {n} links: {e}"))
        })?;
    Ok(Chain { links })
}

impl Chain {
    /// Wraps already-validated links; only emptiness is left to check.
    pub fn from_links(links: Vec<Link>) -> Result<Self> {
        if links.is_empty() {
            return Err(PendulumError::invalid_chain("chain has no links"));
        }
        Ok(Self { links })
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Always false for a constructed chain.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn last(&self) -> &Link {
        // Non-empty by construction.
        &self.links[self.links.len() - 1]
    }

    /// Appends a link at the tail: length max(50, last.length - 10), mass 10, angle π/2, at rest.
    pub fn append_link(&mut self) {
        let length = (self.last().length - 10.0).max(MIN_APPENDED_LENGTH);
        self.links.push(Link {
            length,
            mass: DEFAULT_MASS,
            angle: FRAC_PI_2,
            angular_velocity: 0.0,
        });
    }

    /// Drops the tail link. Returns false (and does nothing) when only one link is left.
    pub fn remove_tail(&mut self) -> bool {
        if self.links.len() <= 1 {
            return false;
        }
        self.links.pop();
        true
    }

    pub fn set_mass(&mut self, index: usize, mass: f64) -> Result<()> {
        check_positive("mass", mass)?;
        self.link_mut(index)?.mass = mass;
        Ok(())
    }

    pub fn set_length(&mut self, index: usize, length: f64) -> Result<()> {
        check_positive("length", length)?;
        self.link_mut(index)?.length = length;
        Ok(())
    }

    fn link_mut(&mut self, index: usize) -> Result<&mut Link> {
        let len = self.links.len();
        self.links.get_mut(index).ok_or_else(|| {
            PendulumError::invalid_parameter(format!(
                "link index {index} out of range for chain of {len}"
            ))
        })
    }

    /// Builds the successor chain from per-link updated states, same order and length.
    pub(crate) fn map_links(&self, f: impl FnMut((usize, &Link)) -> Link) -> Chain {
        Chain {
            links: self.links.iter().enumerate().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_chain_of_two_matches_formula() {
        let chain = create_default_chain(2).unwrap();
        let links = chain.links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0], Link::new(100.0, 10.0, FRAC_PI_2, 0.0).unwrap());
        assert_eq!(links[1].length(), 90.0);
        assert_eq!(links[1].mass(), 10.0);
        assert_relative_eq!(links[1].angle(), FRAC_PI_2 + 0.2);
        assert_eq!(links[1].angular_velocity(), 0.0);
    }

    #[test]
    fn default_chain_rejects_zero_and_overlong() {
        assert!(matches!(
            create_default_chain(0),
            Err(PendulumError::InvalidParameter(_))
        ));
        assert!(create_default_chain(10).is_ok());
        assert_eq!(create_default_chain(10).unwrap().last().length(), 10.0);
        assert!(matches!(
            create_default_chain(11),
            Err(PendulumError::InvalidChain(_))
        ));
    }

    #[test]
    fn link_new_rejects_bad_values() {
        assert!(Link::new(0.0, 1.0, 0.0, 0.0).is_err());
        assert!(Link::new(1.0, -2.0, 0.0, 0.0).is_err());
        assert!(Link::new(f64::NAN, 1.0, 0.0, 0.0).is_err());
        assert!(Link::new(1.0, 1.0, f64::INFINITY, 0.0).is_err());
        assert!(Link::new(1.0, 1.0, -7.5, 3.0).is_ok());
    }

    #[test]
    fn append_uses_shorter_length_with_floor() {
        let mut chain = create_default_chain(1).unwrap();
        chain.append_link();
        assert_eq!(chain.last().length(), 90.0);
        assert_eq!(chain.last().angle(), FRAC_PI_2);

        chain.set_length(1, 55.0).unwrap();
        chain.append_link();
        assert_eq!(chain.last().length(), 50.0);
    }

    #[test]
    fn remove_tail_keeps_last_link() {
        let mut chain = create_default_chain(2).unwrap();
        assert!(chain.remove_tail());
        assert!(!chain.remove_tail());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn failed_edit_leaves_chain_untouched() {
        let mut chain = create_default_chain(3).unwrap();
        let before = chain.clone();
        assert!(chain.set_mass(1, 0.0).is_err());
        assert!(chain.set_length(2, -5.0).is_err());
        assert!(matches!(
            chain.set_mass(3, 4.0),
            Err(PendulumError::InvalidParameter(_))
        ));
        assert_eq!(chain, before);

        chain.set_mass(1, 4.0).unwrap();
        assert_eq!(chain.links()[1].mass(), 4.0);
    }

    #[test]
    fn deserialization_validates() {
        let ok: Chain =
            serde_json::from_str(r#"[{"length": 80, "mass": 2, "angle": 0.5}]"#).unwrap();
        assert_eq!(ok.links()[0].angular_velocity(), 0.0);

        assert!(serde_json::from_str::<Chain>("[]").is_err());
        assert!(serde_json::from_str::<Chain>(r#"[{"length": 0, "mass": 2}]"#).is_err());
    }
}
