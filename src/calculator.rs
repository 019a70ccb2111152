//! Linear change-rate derivation for the measured SOC method
//!
//! The provider's soil organic carbon figure is linear in the gap between the
//! target and measured carbon percentage for a fixed area and bulk density.
//! One confirmed estimate therefore gives a rate that can be reused for
//! instant, provider-free previews while the user adjusts the inputs.

use std::fmt;

use anyhow::{Result, anyhow};
use rusqlite::Connection;

use crate::cobenefits::CobenefitCatalog;
use crate::db;
use crate::models::{BaselineEstimate, ChangeRate, MethodEstimate, RatingCategory, SOC_MEASURE_METHOD};

/// Derive ACCUs per year per percentage point from a confirmed estimate
pub fn derive_change_rate(baseline_annual: f64, carbon_average: f64, carbon_target: f64) -> ChangeRate {
    let delta = carbon_target - carbon_average;
    if delta.abs() < f64::EPSILON || !baseline_annual.is_finite() {
        return ChangeRate::Unavailable;
    }
    ChangeRate::AnnualPerPercent(baseline_annual / delta)
}

/// Outcome of a local re-estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpolation {
    /// Not confirmed by the provider until committed
    Provisional { annual: i64 },
    /// No rate available; a full estimate is required first
    Unavailable,
}

/// Annual estimate for new carbon inputs, using a previously derived rate
pub fn interpolate(rate: ChangeRate, carbon_average: f64, carbon_target: f64) -> Interpolation {
    match rate {
        ChangeRate::AnnualPerPercent(per_percent) => Interpolation::Provisional {
            annual: (per_percent * (carbon_target - carbon_average)).round() as i64,
        },
        ChangeRate::Unavailable => Interpolation::Unavailable,
    }
}

/// Re-estimate the SOC method for new inputs without calling the provider.
/// Uses the rate stored with the baseline; it is never re-derived here.
pub fn preview_carbon_change(
    conn: &Connection,
    estimate_id: i64,
    carbon_average: f64,
    carbon_target: f64,
) -> Result<PreviewSummary> {
    let baseline = db::get_baseline(conn, estimate_id)?
        .ok_or_else(|| anyhow!("estimate {} not found", estimate_id))?;
    let confirmed_annual = db::list_method_estimates(conn, estimate_id)?
        .into_iter()
        .find(|m| m.method_id == SOC_MEASURE_METHOD)
        .map(|m| m.annual);

    Ok(PreviewSummary {
        estimate_id,
        carbon_average,
        carbon_target,
        confirmed_annual,
        result: interpolate(baseline.change_rate, carbon_average, carbon_target),
    })
}

/// Load a stored estimate with display names for its methods
pub fn summarize_estimate(
    conn: &Connection,
    estimate_id: i64,
    catalog: &CobenefitCatalog,
) -> Result<EstimateSummary> {
    let baseline = db::get_baseline(conn, estimate_id)?
        .ok_or_else(|| anyhow!("estimate {} not found", estimate_id))?;
    let methods = db::list_method_estimates(conn, estimate_id)?
        .into_iter()
        .map(|m| (catalog.display_name(&m.method_id), m))
        .collect();
    let average_rating = db::average_summary_rating(conn, estimate_id)?;

    Ok(EstimateSummary {
        baseline,
        methods,
        average_rating,
    })
}

/// Preview of a carbon target change for one stored estimate
#[derive(Debug)]
pub struct PreviewSummary {
    pub estimate_id: i64,
    pub carbon_average: f64,
    pub carbon_target: f64,
    pub confirmed_annual: Option<f64>,
    pub result: Interpolation,
}

impl fmt::Display for PreviewSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SOC Preview (estimate {}) ===", self.estimate_id)?;
        writeln!(
            f,
            "Carbon: {:.1}% -> {:.1}%",
            self.carbon_average, self.carbon_target
        )?;
        if let Some(annual) = self.confirmed_annual {
            writeln!(f, "Confirmed: {:.0} ACCUs/yr", annual)?;
        }
        match self.result {
            Interpolation::Provisional { annual } => {
                writeln!(f, "Provisional: {} ACCUs/yr (run `update` to confirm)", annual)
            }
            Interpolation::Unavailable => {
                writeln!(f, "Provisional: n/a (no change rate, run `update` first)")
            }
        }
    }
}

/// A stored estimate with its method rows, ready for display
#[derive(Debug)]
pub struct EstimateSummary {
    pub baseline: BaselineEstimate,
    pub methods: Vec<(String, MethodEstimate)>,
    pub average_rating: Option<f64>,
}

impl fmt::Display for EstimateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.baseline;
        writeln!(f, "=== Estimate {} (asset {}) ===", b.id, b.asset_id)?;
        writeln!(
            f,
            "Area: {:.1} ha  Bulk density: {:.2}  Carbon: {:.1}% -> {:.1}%",
            b.polygon_area, b.bulk_density_average, b.carbon_average, b.carbon_target
        )?;
        if let Some(selected) = &b.selected_method {
            writeln!(f, "Selected method: {}", selected)?;
        }
        if let Some(average) = self.average_rating {
            writeln!(f, "Average LRF rating: {:.1}", average)?;
        }
        if let Some(warning) = b.warning_message.as_deref().filter(|w| !w.is_empty()) {
            writeln!(f, "Warnings: {}", warning)?;
        }
        writeln!(f)?;

        writeln!(f, "{:<40} {:>10} {:>12}", "Method", "Annual", "Project")?;
        writeln!(f, "{}", "-".repeat(64))?;
        for (name, estimate) in &self.methods {
            writeln!(
                f,
                "{:<40} {:>10.0} {:>12.0}",
                name, estimate.annual, estimate.project_total
            )?;
            if let Some(ratings) = &estimate.cobenefit_ratings {
                let line: Vec<String> = RatingCategory::ALL
                    .iter()
                    .filter_map(|c| ratings.get(c).map(|v| format!("{}: {}", c.label(), v)))
                    .collect();
                writeln!(f, "    LRF {}", line.join(", "))?;
            }
            if let Some(warning) = &estimate.warning_message {
                writeln!(f, "    ! {}", warning.replace('\n', "\n    ! "))?;
            }
        }
        Ok(())
    }
}
