//! Data models for project areas, ACCU estimates and baselines

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default project horizon in years
pub const DEFAULT_PROJECT_LENGTH: u32 = 25;

/// Method id under which the measured soil organic carbon estimate is stored
pub const SOC_MEASURE_METHOD: &str = "soc-measure";

/// A single vertex of a parcel, in the shape the provider expects
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Ordered points of a parcel's geometry. Never empty once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProjectArea(Vec<LatLng>);

impl ProjectArea {
    /// Returns `None` when there are no points to submit
    pub fn new(points: Vec<LatLng>) -> Option<Self> {
        if points.is_empty() {
            None
        } else {
            Some(Self(points))
        }
    }

    pub fn points(&self) -> &[LatLng] {
        &self.0
    }
}

/// Which figure an ERF response key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Annual,
    Project,
}

/// Ecological categories an LRF co-benefit rating can be reported against
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RatingCategory {
    GreatBarrierReef,
    CoastalEcosystems,
    Wetlands,
    ThreatenedEcosystems,
    ThreatenedWildlife,
    NativeVegetation,
    Summary,
}

impl RatingCategory {
    pub const ALL: [RatingCategory; 7] = [
        RatingCategory::GreatBarrierReef,
        RatingCategory::CoastalEcosystems,
        RatingCategory::Wetlands,
        RatingCategory::ThreatenedEcosystems,
        RatingCategory::ThreatenedWildlife,
        RatingCategory::NativeVegetation,
        RatingCategory::Summary,
    ];

    /// Map a provider rating key onto a category. Unknown keys yield `None`.
    pub fn from_provider_key(key: &str) -> Option<Self> {
        match key {
            "greatBarrierReef" => Some(RatingCategory::GreatBarrierReef),
            "coastalEcosystems" => Some(RatingCategory::CoastalEcosystems),
            "wetlands" => Some(RatingCategory::Wetlands),
            "threatenedEcosystems" => Some(RatingCategory::ThreatenedEcosystems),
            "threatenedWildlife" => Some(RatingCategory::ThreatenedWildlife),
            "nativeVegetation" => Some(RatingCategory::NativeVegetation),
            "summary" => Some(RatingCategory::Summary),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RatingCategory::GreatBarrierReef => "Great barrier reef",
            RatingCategory::CoastalEcosystems => "Coastal ecosystems",
            RatingCategory::Wetlands => "Wetlands",
            RatingCategory::ThreatenedEcosystems => "Threatened ecosystems",
            RatingCategory::ThreatenedWildlife => "Threatened wildlife",
            RatingCategory::NativeVegetation => "Native vegetation",
            RatingCategory::Summary => "Summary",
        }
    }
}

/// Co-benefit ratings for one method, restricted to the fixed category set
pub type RatingSet = BTreeMap<RatingCategory, f64>;

/// Per-method figures as they come out of the key parser or sub-area merge.
/// Either figure may still be missing at this stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialEstimate {
    pub annual: Option<f64>,
    pub project: Option<f64>,
    pub warning_message: Option<String>,
}

impl PartialEstimate {
    pub fn set(&mut self, interval: Interval, value: f64) {
        match interval {
            Interval::Annual => self.annual = Some(value),
            Interval::Project => self.project = Some(value),
        }
    }

    /// Promote to a complete estimate if both figures are present.
    /// Ratings are attached later, once the method is known to be complete.
    pub fn complete(self, method_id: &str) -> Option<MethodEstimate> {
        Some(MethodEstimate {
            method_id: method_id.to_string(),
            annual: self.annual?,
            project_total: self.project?,
            warning_message: self.warning_message,
            cobenefit_ratings: None,
        })
    }
}

/// Canonical per-method ACCU estimate
#[derive(Debug, Clone, PartialEq)]
pub struct MethodEstimate {
    pub method_id: String,
    pub annual: f64,
    pub project_total: f64,
    pub warning_message: Option<String>,
    pub cobenefit_ratings: Option<RatingSet>,
}

/// Anchor record for a project area, one per asset
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineEstimate {
    pub id: i64,
    pub asset_id: i64,
    pub timestamp: i64,
    pub project_length: u32,
    pub new_irrigation: bool,
    pub polygon_area: f64,
    pub bulk_density_average: f64,
    pub carbon_average: f64,
    pub carbon_target: f64,
    pub warning_message: Option<String>,
    pub selected_method: Option<String>,
    pub change_rate: ChangeRate,
}

/// ACCUs per year for each percentage point of soil organic carbon change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeRate {
    AnnualPerPercent(f64),
    /// Target equalled the measured average when the rate was derived
    Unavailable,
}

impl ChangeRate {
    pub fn as_option(self) -> Option<f64> {
        match self {
            ChangeRate::AnnualPerPercent(rate) => Some(rate),
            ChangeRate::Unavailable => None,
        }
    }

    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(ChangeRate::Unavailable, ChangeRate::AnnualPerPercent)
    }
}

/// User supplied inputs for an estimate run
#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    pub project_types: Vec<String>,
    pub carbon_improvement: f64,
    pub new_irrigation: bool,
    pub project_length: u32,
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self {
            project_types: Vec::new(),
            carbon_improvement: 0.0,
            new_irrigation: false,
            project_length: DEFAULT_PROJECT_LENGTH,
        }
    }
}
