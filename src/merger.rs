//! Totalling of soil estimates across SA2 sub-areas
//!
//! Sub-areas are disjoint pieces of the parcel and the figures are quantities,
//! so per project type the annual and whole-project values are summed.

use std::collections::BTreeMap;

use crate::client::SoilProjectEstimate;
use crate::models::PartialEstimate;

/// Every sub-area's contribution for one project type
#[derive(Debug, Clone, Default, PartialEq)]
struct TypeFigures {
    annual: Vec<f64>,
    total: Vec<f64>,
}

/// Per project type figures collected from each sub-area. Sums are only
/// taken in `finish`, over sorted values, so the result is the same whatever
/// order sub-areas were absorbed or combined in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoilTotals {
    by_type: BTreeMap<String, TypeFigures>,
}

impl SoilTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sub-area's estimates
    pub fn absorb(mut self, estimates: &[SoilProjectEstimate]) -> Self {
        for estimate in estimates {
            let entry = self.by_type.entry(estimate.project_type.clone()).or_default();
            entry.annual.push(estimate.annual);
            entry.total.push(estimate.total);
        }
        self
    }

    pub fn combine(mut self, other: SoilTotals) -> Self {
        for (project_type, other_figures) in other.by_type {
            let entry = self.by_type.entry(project_type).or_default();
            entry.annual.extend(other_figures.annual);
            entry.total.extend(other_figures.total);
        }
        self
    }

    /// Final per-type figures, rounded to one decimal place
    pub fn finish(self) -> BTreeMap<String, PartialEstimate> {
        self.by_type
            .into_iter()
            .map(|(project_type, figures)| {
                let estimate = PartialEstimate {
                    annual: Some(round_to(canonical_sum(figures.annual), 1)),
                    project: Some(round_to(canonical_sum(figures.total), 1)),
                    ..PartialEstimate::default()
                };
                (project_type, estimate)
            })
            .collect()
    }
}

/// Float addition is not associative; summing in sorted order keeps the
/// rounded result independent of arrival order.
fn canonical_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
