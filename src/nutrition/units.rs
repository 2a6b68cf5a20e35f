//! Volume unit constants and household-measure rendering

// ============================================================================
// Volume Conversion Constants (to milliliters, US customary)
// ============================================================================

/// Milliliters per teaspoon
pub const ML_PER_TSP: f64 = 4.92892;
/// Milliliters per tablespoon
pub const ML_PER_TBSP: f64 = 14.7868;
/// Milliliters per fluid ounce
pub const ML_PER_FL_OZ: f64 = 29.5735;
/// Milliliters per cup (US)
pub const ML_PER_CUP: f64 = 236.588;
/// Milliliters per liter
pub const ML_PER_LITER: f64 = 1000.0;

// ============================================================================
// Unit Recognition
// ============================================================================

/// Conversion factor to milliliters for a volume unit
pub fn ml_per_unit(unit: &str) -> Option<f64> {
    let lower = unit.to_lowercase();
    let trimmed = lower.trim();

    match trimmed {
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => Some(1.0),
        "l" | "liter" | "liters" | "litre" | "litres" => Some(ML_PER_LITER),
        "tsp" | "teaspoon" | "teaspoons" => Some(ML_PER_TSP),
        "tbsp" | "tablespoon" | "tablespoons" => Some(ML_PER_TBSP),
        "fl oz" | "floz" | "fluid ounce" | "fluid ounces" => Some(ML_PER_FL_OZ),
        "cup" | "cups" => Some(ML_PER_CUP),
        "cm3" | "cc" => Some(1.0),
        _ => None,
    }
}

/// Convert `amount` of `unit` to milliliters
pub fn volume_to_ml(amount: f64, unit: &str) -> Option<f64> {
    ml_per_unit(unit).map(|factor| amount * factor)
}

/// Mass in grams from a volume and a density (g/mL)
pub fn mass_grams(volume_ml: f64, density_g_per_ml: f64) -> f64 {
    volume_ml * density_g_per_ml
}

// ============================================================================
// Household Measures
// ============================================================================

/// Human-readable measure for a volume: teaspoons and tablespoons for small
/// portions, quarter cups up to a liter, liters beyond.
pub fn household_measure(volume_ml: f64) -> String {
    if !volume_ml.is_finite() || volume_ml <= 0.0 {
        return "0 tsp".to_string();
    }
    if volume_ml < ML_PER_TBSP {
        return format!("{:.1} tsp", volume_ml / ML_PER_TSP);
    }
    if volume_ml < ML_PER_CUP / 4.0 {
        return format!("{:.1} tbsp", volume_ml / ML_PER_TBSP);
    }
    if volume_ml < ML_PER_LITER {
        return quarter_cups((volume_ml / ML_PER_CUP * 4.0).round() as u64);
    }
    format!("{:.2} L", volume_ml / ML_PER_LITER)
}

fn quarter_cups(quarters: u64) -> String {
    let whole = quarters / 4;
    let fraction = match quarters % 4 {
        1 => Some("1/4"),
        2 => Some("1/2"),
        3 => Some("3/4"),
        _ => None,
    };
    match (whole, fraction) {
        (0, Some(f)) => format!("{} cup", f),
        (1, None) => "1 cup".to_string(),
        (w, None) => format!("{} cups", w),
        (w, Some(f)) => format!("{} {} cups", w, f),
    }
}
