use super::fields::PhysicalModel;
use crate::core::constants::{GRAV, SOLAR_MASS};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;

/// A scalar field that depends only on the distance from the origin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum RadialProfile {
    Constant {
        value: f64,
    },
    /// `value * (max(r, inner_radius) / reference_radius)^index`.
    PowerLaw {
        value: f64,
        #[serde(rename = "reference-radius")]
        reference_radius: f64,
        index: f64,
        #[serde(rename = "inner-radius", default)]
        inner_radius: Option<f64>,
    },
}

impl RadialProfile {
    pub fn evaluate(&self, r: f64) -> f64 {
        match *self {
            Self::Constant { value } => value,
            Self::PowerLaw {
                value,
                reference_radius,
                index,
                inner_radius,
            } => {
                let inner = inner_radius.unwrap_or(reference_radius * 1e-3);
                value * (r.max(inner) / reference_radius).powf(index)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum VelocityProfile {
    #[default]
    Static,
    /// Free fall onto a central mass given in solar masses.
    Infall {
        #[serde(rename = "central-mass")]
        central_mass: f64,
    },
}

impl VelocityProfile {
    pub fn evaluate(&self, position: &Point3<f64>) -> Vector3<f64> {
        match *self {
            Self::Static => Vector3::zeros(),
            Self::Infall { central_mass } => {
                let r = position.coords.norm();
                if r == 0.0 {
                    return Vector3::zeros();
                }
                let speed = (2.0 * GRAV * central_mass * SOLAR_MASS / r).sqrt();
                -position.coords / r * speed
            }
        }
    }
}

fn default_gas_to_dust() -> f64 {
    100.0
}

/// Spherically symmetric model assembled from radial profiles.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParametricModel {
    /// One profile per collision partner.
    pub densities: Vec<RadialProfile>,
    pub temperature: RadialProfile,
    #[serde(rename = "dust-temperature", default)]
    pub dust_temperature: Option<RadialProfile>,
    /// One profile per species.
    pub abundances: Vec<RadialProfile>,
    pub doppler: f64,
    #[serde(default)]
    pub velocity: VelocityProfile,
    #[serde(rename = "gas-to-dust", default = "default_gas_to_dust")]
    pub gas_to_dust: f64,
}

impl ParametricModel {
    /// Uniform medium with a single collision partner and static gas.
    pub fn uniform(density: f64, temperature: f64, abundances: &[f64], doppler: f64) -> Self {
        Self {
            densities: vec![RadialProfile::Constant { value: density }],
            temperature: RadialProfile::Constant { value: temperature },
            dust_temperature: None,
            abundances: abundances
                .iter()
                .map(|&value| RadialProfile::Constant { value })
                .collect(),
            doppler,
            velocity: VelocityProfile::Static,
            gas_to_dust: default_gas_to_dust(),
        }
    }
}

impl PhysicalModel for ParametricModel {
    fn density(&self, position: &Point3<f64>) -> Vec<f64> {
        let r = position.coords.norm();
        self.densities.iter().map(|p| p.evaluate(r)).collect()
    }

    fn temperature(&self, position: &Point3<f64>) -> [f64; 2] {
        let r = position.coords.norm();
        let dust = self
            .dust_temperature
            .as_ref()
            .map(|p| p.evaluate(r))
            .unwrap_or(0.0);
        [self.temperature.evaluate(r), dust]
    }

    fn abundance(&self, position: &Point3<f64>) -> Vec<f64> {
        let r = position.coords.norm();
        self.abundances.iter().map(|p| p.evaluate(r)).collect()
    }

    fn doppler(&self, _position: &Point3<f64>) -> f64 {
        self.doppler
    }

    fn velocity(&self, position: &Point3<f64>) -> Vector3<f64> {
        self.velocity.evaluate(position)
    }

    fn gas_to_dust(&self, _position: &Point3<f64>) -> f64 {
        self.gas_to_dust
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::AU;

    #[test]
    fn power_law_scales_with_radius_and_respects_inner_radius() {
        let profile = RadialProfile::PowerLaw {
            value: 1e12,
            reference_radius: AU,
            index: -1.5,
            inner_radius: Some(0.5 * AU),
        };
        assert!((profile.evaluate(AU) - 1e12).abs() < 1.0);
        assert!((profile.evaluate(4.0 * AU) - 1e12 / 8.0).abs() < 1.0);
        assert_eq!(profile.evaluate(0.0), profile.evaluate(0.5 * AU));
    }

    #[test]
    fn infall_points_inwards_with_free_fall_speed() {
        let profile = VelocityProfile::Infall { central_mass: 1.0 };
        let pos = Point3::new(100.0 * AU, 0.0, 0.0);
        let v = profile.evaluate(&pos);
        let expected = (2.0 * GRAV * SOLAR_MASS / (100.0 * AU)).sqrt();
        assert!(v.x < 0.0);
        assert!((v.norm() - expected).abs() / expected < 1e-12);
        assert_eq!(profile.evaluate(&Point3::origin()), Vector3::zeros());
    }

    #[test]
    fn model_deserializes_from_toml() {
        let model: ParametricModel = toml::from_str(
            r#"
            doppler = 150.0
            temperature = { type = "constant", value = 25.0 }
            abundances = [{ type = "constant", value = 1e-9 }]
            velocity = { type = "infall", central-mass = 1.0 }

            [[densities]]
            type = "power-law"
            value = 1.5e14
            reference-radius = 1.5e13
            index = -1.5
            "#,
        )
        .unwrap();
        assert_eq!(model.densities.len(), 1);
        assert_eq!(model.gas_to_dust, 100.0);
        assert_eq!(model.temperature(&Point3::new(1.0, 0.0, 0.0)), [25.0, 0.0]);
        assert!(matches!(model.velocity, VelocityProfile::Infall { .. }));
    }
}
