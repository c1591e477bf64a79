//! Interaction parameters.
//!
//! All structs deserialize from JSON with defaults for missing fields and
//! are checked once by [`InteractionParams::validate`].

use serde::{Deserialize, Serialize};

use crate::entity::LinkerType;
use crate::error::{Error, Result};

/// Penalty law of beam contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyLaw {
    /// `f = -eps * g` for `g < 0`.
    Linear,
    /// Linear for `g <= 0`, quadratic regularization up to `g0`.
    LinPosQuadPen,
}

impl std::fmt::Display for PenaltyLaw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::LinPosQuadPen => write!(f, "lin-pos-quad"),
        }
    }
}

/// Beam-to-beam and beam-to-sphere contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamContactParams {
    /// Penalty parameter `eps`.
    pub penalty: f64,
    pub law: PenaltyLaw,
    /// Regularization gap `g0` of [`PenaltyLaw::LinPosQuadPen`].
    pub regularization_gap: f64,
    /// Also monitor beam-to-sphere pairs.
    pub beam_sphere: bool,
    /// Factor on the largest beam radius for the search distance.
    pub safety_factor: f64,
}

impl Default for BeamContactParams {
    fn default() -> Self {
        Self {
            penalty: 100.0,
            law: PenaltyLaw::Linear,
            regularization_gap: 0.0,
            beam_sphere: false,
            safety_factor: 1.5,
        }
    }
}

impl BeamContactParams {
    #[must_use]
    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    #[must_use]
    pub fn with_law(mut self, law: PenaltyLaw, regularization_gap: f64) -> Self {
        self.law = law;
        self.regularization_gap = regularization_gap;
        self
    }

    #[must_use]
    pub fn with_beam_sphere(mut self, enabled: bool) -> Self {
        self.beam_sphere = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.penalty > 0.0) {
            return Err(invalid(format!("contact penalty must be positive, got {}", self.penalty)));
        }
        if self.law == PenaltyLaw::LinPosQuadPen && !(self.regularization_gap > 0.0) {
            return Err(invalid(format!(
                "{} law needs a positive regularization gap, got {}",
                self.law, self.regularization_gap
            )));
        }
        if !(self.safety_factor >= 1.0) {
            return Err(invalid(format!("safety factor must be at least 1, got {}", self.safety_factor)));
        }
        Ok(())
    }
}

/// Kinetics and mechanics of one linker type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerParams {
    pub linker: LinkerType,
    /// Binding rate.
    pub k_on: f64,
    /// Force-free unbinding rate.
    pub k_off0: f64,
    /// Bell length scale.
    pub x_beta: f64,
    pub linking_length_min: f64,
    pub linking_length_max: f64,
    /// Allowed enclosed angle between the two filaments, radians.
    pub angle_min: f64,
    pub angle_max: f64,
    /// Axial spring stiffness of a double-bonded linker.
    pub stiffness: f64,
}

impl Default for LinkerParams {
    fn default() -> Self {
        Self {
            linker: LinkerType::Arbitrary,
            k_on: 1.0,
            k_off0: 0.0,
            x_beta: 0.0,
            linking_length_min: 0.0,
            linking_length_max: 1.0,
            angle_min: 0.0,
            angle_max: std::f64::consts::FRAC_PI_2,
            stiffness: 1.0,
        }
    }
}

impl LinkerParams {
    #[must_use]
    pub fn with_linker(mut self, linker: LinkerType) -> Self {
        self.linker = linker;
        self
    }

    #[must_use]
    pub fn with_rates(mut self, k_on: f64, k_off0: f64) -> Self {
        self.k_on = k_on;
        self.k_off0 = k_off0;
        self
    }

    #[must_use]
    pub fn with_x_beta(mut self, x_beta: f64) -> Self {
        self.x_beta = x_beta;
        self
    }

    #[must_use]
    pub fn with_linking_length(mut self, min: f64, max: f64) -> Self {
        self.linking_length_min = min;
        self.linking_length_max = max;
        self
    }

    #[must_use]
    pub fn with_angle(mut self, min: f64, max: f64) -> Self {
        self.angle_min = min;
        self.angle_max = max;
        self
    }

    #[must_use]
    pub fn with_stiffness(mut self, stiffness: f64) -> Self {
        self.stiffness = stiffness;
        self
    }

    /// Distance at which a free linker can catch a spot.
    pub fn capture_radius(&self) -> f64 {
        0.5 * self.linking_length_max
    }

    fn validate(&self) -> Result<()> {
        if self.k_on < 0.0 || self.k_off0 < 0.0 || self.x_beta < 0.0 {
            return Err(invalid(format!("{:?}: rates and x_beta must be non-negative", self.linker)));
        }
        if !(self.linking_length_min >= 0.0 && self.linking_length_max > self.linking_length_min) {
            return Err(invalid(format!(
                "{:?}: linking length range [{}, {}] is empty",
                self.linker, self.linking_length_min, self.linking_length_max
            )));
        }
        if !(self.angle_min >= 0.0 && self.angle_max >= self.angle_min && self.angle_max <= std::f64::consts::PI)
        {
            return Err(invalid(format!(
                "{:?}: angle range [{}, {}] outside [0, pi]",
                self.linker, self.angle_min, self.angle_max
            )));
        }
        if !(self.stiffness > 0.0) {
            return Err(invalid(format!("{:?}: linker stiffness must be positive", self.linker)));
        }
        Ok(())
    }
}

/// Crosslinker binding, unbinding and diffusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosslinkingParams {
    pub linkers: Vec<LinkerParams>,
    /// Thermal energy `k_B T`.
    pub kt: f64,
    /// Diffusion coefficient of free linkers.
    pub diffusion: f64,
}

impl Default for CrosslinkingParams {
    fn default() -> Self {
        Self {
            linkers: vec![LinkerParams::default()],
            kt: 0.00404,
            diffusion: 0.0,
        }
    }
}

impl CrosslinkingParams {
    #[must_use]
    pub fn with_linker(mut self, params: LinkerParams) -> Self {
        self.linkers.retain(|l| l.linker != params.linker);
        self.linkers.push(params);
        self
    }

    #[must_use]
    pub fn with_kt(mut self, kt: f64) -> Self {
        self.kt = kt;
        self
    }

    #[must_use]
    pub fn with_diffusion(mut self, diffusion: f64) -> Self {
        self.diffusion = diffusion;
        self
    }

    /// Parameters of a linker type.
    pub fn linker(&self, linker: LinkerType) -> Option<&LinkerParams> {
        self.linkers.iter().find(|l| l.linker == linker)
    }

    pub fn max_linking_length(&self) -> f64 {
        self.linkers.iter().map(|l| l.linking_length_max).fold(0.0, f64::max)
    }

    fn validate(&self) -> Result<()> {
        if self.linkers.is_empty() {
            return Err(invalid("crosslinking needs at least one linker type".into()));
        }
        for (i, l) in self.linkers.iter().enumerate() {
            if self.linkers[..i].iter().any(|o| o.linker == l.linker) {
                return Err(invalid(format!("linker type {:?} configured twice", l.linker)));
            }
            l.validate()?;
        }
        if !(self.kt > 0.0) || self.diffusion < 0.0 {
            return Err(invalid(format!(
                "kT must be positive and diffusion non-negative, got {} and {}",
                self.kt, self.diffusion
            )));
        }
        Ok(())
    }
}

/// Particle contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemParams {
    pub normal_stiffness: f64,
    pub normal_damping: f64,
    pub tangential_stiffness: f64,
    pub tangential_damping: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
    pub rolling_stiffness: f64,
    /// Rolling friction coefficient; 0 disables rolling resistance.
    pub rolling_friction: f64,
    /// Mean adhesion surface energy; 0 disables adhesion.
    pub adhesion_surface_energy: f64,
    /// Relative spread of the per-pair surface energy.
    pub adhesion_spread: f64,
    /// Gap up to which adhesion acts.
    pub adhesion_distance: f64,
}

impl Default for DemParams {
    fn default() -> Self {
        Self {
            normal_stiffness: 1.0e3,
            normal_damping: 0.0,
            tangential_stiffness: 0.0,
            tangential_damping: 0.0,
            friction: 0.0,
            rolling_stiffness: 0.0,
            rolling_friction: 0.0,
            adhesion_surface_energy: 0.0,
            adhesion_spread: 0.0,
            adhesion_distance: 0.0,
        }
    }
}

impl DemParams {
    #[must_use]
    pub fn with_normal(mut self, stiffness: f64, damping: f64) -> Self {
        self.normal_stiffness = stiffness;
        self.normal_damping = damping;
        self
    }

    #[must_use]
    pub fn with_tangential(mut self, stiffness: f64, damping: f64, friction: f64) -> Self {
        self.tangential_stiffness = stiffness;
        self.tangential_damping = damping;
        self.friction = friction;
        self
    }

    #[must_use]
    pub fn with_rolling(mut self, stiffness: f64, friction: f64) -> Self {
        self.rolling_stiffness = stiffness;
        self.rolling_friction = friction;
        self
    }

    #[must_use]
    pub fn with_adhesion(mut self, surface_energy: f64, spread: f64, distance: f64) -> Self {
        self.adhesion_surface_energy = surface_energy;
        self.adhesion_spread = spread;
        self.adhesion_distance = distance;
        self
    }

    pub fn tangential_enabled(&self) -> bool {
        self.tangential_stiffness > 0.0
    }

    pub fn rolling_enabled(&self) -> bool {
        self.rolling_stiffness > 0.0
    }

    pub fn adhesion_enabled(&self) -> bool {
        self.adhesion_surface_energy > 0.0
    }

    fn validate(&self) -> Result<()> {
        if !(self.normal_stiffness > 0.0) {
            return Err(invalid(format!("normal stiffness must be positive, got {}", self.normal_stiffness)));
        }
        let non_negative = [
            ("normal damping", self.normal_damping),
            ("tangential stiffness", self.tangential_stiffness),
            ("tangential damping", self.tangential_damping),
            ("friction", self.friction),
            ("rolling stiffness", self.rolling_stiffness),
            ("rolling friction", self.rolling_friction),
            ("adhesion surface energy", self.adhesion_surface_energy),
            ("adhesion distance", self.adhesion_distance),
        ];
        if let Some((name, value)) = non_negative.iter().find(|(_, v)| !(*v >= 0.0)) {
            return Err(invalid(format!("{name} must be non-negative, got {value}")));
        }
        if !(0.0..1.0).contains(&self.adhesion_spread) {
            return Err(invalid(format!("adhesion spread must be in [0, 1), got {}", self.adhesion_spread)));
        }
        Ok(())
    }
}

/// Everything the interaction layer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionParams {
    /// Time step size.
    pub dt: f64,
    /// Seed of every reproducible draw.
    pub seed: u64,
    /// Emit a visualization frame every this many steps; 0 disables output.
    pub output_interval: u64,
    pub contact: Option<BeamContactParams>,
    pub crosslinking: Option<CrosslinkingParams>,
    pub dem: Option<DemParams>,
}

impl Default for InteractionParams {
    fn default() -> Self {
        Self {
            dt: 1.0e-3,
            seed: 0,
            output_interval: 0,
            contact: None,
            crosslinking: None,
            dem: None,
        }
    }
}

impl InteractionParams {
    /// Parse and validate JSON parameters.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    #[must_use]
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_output_interval(mut self, interval: u64) -> Self {
        self.output_interval = interval;
        self
    }

    #[must_use]
    pub fn with_contact(mut self, contact: BeamContactParams) -> Self {
        self.contact = Some(contact);
        self
    }

    #[must_use]
    pub fn with_crosslinking(mut self, crosslinking: CrosslinkingParams) -> Self {
        self.crosslinking = Some(crosslinking);
        self
    }

    #[must_use]
    pub fn with_dem(mut self, dem: DemParams) -> Self {
        self.dem = Some(dem);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(invalid(format!("time step must be positive, got {}", self.dt)));
        }
        if let Some(contact) = &self.contact {
            contact.validate()?;
        }
        if let Some(crosslinking) = &self.crosslinking {
            crosslinking.validate()?;
        }
        if let Some(dem) = &self.dem {
            dem.validate()?;
        }
        Ok(())
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidParameter(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        InteractionParams::default()
            .with_contact(BeamContactParams::default())
            .with_crosslinking(CrosslinkingParams::default())
            .with_dem(DemParams::default())
            .validate()
            .unwrap();
    }

    #[test]
    fn quadratic_law_needs_gap() {
        let params = InteractionParams::default()
            .with_contact(BeamContactParams::default().with_law(PenaltyLaw::LinPosQuadPen, 0.0));
        assert!(matches!(params.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn empty_linking_range_is_rejected() {
        let params = InteractionParams::default().with_crosslinking(
            CrosslinkingParams::default().with_linker(LinkerParams::default().with_linking_length(1.0, 1.0)),
        );
        assert!(params.validate().is_err());
    }

    #[test]
    fn with_linker_replaces_same_type() {
        let params = CrosslinkingParams::default().with_linker(LinkerParams::default().with_rates(5.0, 0.1));
        assert_eq!(params.linkers.len(), 1);
        assert_eq!(params.linker(LinkerType::Arbitrary).unwrap().k_on, 5.0);
    }

    #[test]
    fn parses_partial_json() {
        let json = r#"{
            "dt": 0.01,
            "seed": 7,
            "contact": { "penalty": 50.0, "law": "LinPosQuadPen", "regularization_gap": 0.01 },
            "dem": { "normal_stiffness": 200.0 }
        }"#;
        let params = InteractionParams::from_json(json).unwrap();
        assert_eq!(params.seed, 7);
        assert_eq!(params.contact.as_ref().unwrap().law, PenaltyLaw::LinPosQuadPen);
        assert_eq!(params.contact.unwrap().safety_factor, 1.5);
        assert_eq!(params.dem.unwrap().normal_stiffness, 200.0);
        assert!(params.crosslinking.is_none());
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        assert!(matches!(
            InteractionParams::from_json("{ \"dt\": "),
            Err(Error::Serialization(_))
        ));
    }
}
