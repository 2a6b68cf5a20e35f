//! Delta-method propagation through volume x density x energy density

use crate::models::{CalorieEstimate, EstimateSource, FoodPriors, PriorStat};

/// sigma / |mu|
///
/// A zero mean yields `f64::INFINITY` unless sigma is also zero.
pub fn relative_uncertainty(mu: f64, sigma: f64) -> f64 {
    if mu == 0.0 {
        if sigma == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        sigma.abs() / mu.abs()
    }
}

/// Calories from a volume (mL) and density/energy priors
///
/// mu_C = mu_V * mu_rho * mu_E. The first-order variance is summed in
/// absolute form, which equals the sum of relative variances whenever every
/// mean is non-zero and stays defined when one is zero. Sigma never drops
/// below `min_sigma_kcal`.
pub fn propagate_calories(
    volume_ml: PriorStat,
    priors: &FoodPriors,
    min_sigma_kcal: f64,
) -> CalorieEstimate {
    let (v, rho, e) = (volume_ml, priors.density, priors.energy_density);
    let mu = v.mu * rho.mu * e.mu;

    let d_volume = v.sigma * rho.mu * e.mu;
    let d_density = v.mu * rho.sigma * e.mu;
    let d_energy = v.mu * rho.mu * e.sigma;
    let sigma = (d_volume * d_volume + d_density * d_density + d_energy * d_energy).sqrt();

    CalorieEstimate::new(mu, sigma.max(min_sigma_kcal), EstimateSource::Geometry)
}
