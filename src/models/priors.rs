//! Calibrated physical quantities

use serde::{Deserialize, Serialize};

/// A quantity with Gaussian uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorStat {
    pub mu: f64,
    pub sigma: f64,
}

impl PriorStat {
    /// Sigma is stored non-negative
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self {
            mu,
            sigma: sigma.abs(),
        }
    }
}

/// Density (g/mL) and energy density (kcal/g) of a food
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodPriors {
    pub density: PriorStat,
    pub energy_density: PriorStat,
}

impl FoodPriors {
    pub fn new(density: PriorStat, energy_density: PriorStat) -> Self {
        Self {
            density,
            energy_density,
        }
    }
}

impl Default for FoodPriors {
    /// Generic mixed-plate priors: water-like density, moderate energy density
    fn default() -> Self {
        Self {
            density: PriorStat::new(1.0, 0.15),
            energy_density: PriorStat::new(1.5, 0.6),
        }
    }
}
