//! Estimate aggregation across ERF, soil and measured SOC methods
//!
//! One run calls the provider for every method family, normalises the
//! differently shaped payloads into `MethodEstimate`s, attaches warnings and
//! LRF ratings to the right method, and derives the SOC change-rate that
//! later powers local previews.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::calculator::derive_change_rate;
use crate::client::{EstimationProvider, SocRequest, SoilRequest, SubArea};
use crate::config::SOC_DEPTH_CM;
use crate::db;
use crate::error::{ClientError, EstimateError};
use crate::keys::parse_erf_payload;
use crate::merger::{SoilTotals, round_to};
use crate::models::{
    BaselineEstimate, ChangeRate, MethodEstimate, PartialEstimate, ProjectArea, ProjectMetadata,
    RatingCategory, RatingSet, SOC_MEASURE_METHOD,
};

/// Every upstream call the aggregator makes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCall {
    Jurisdiction,
    ErfBatch,
    SubAreaList,
    SubAreaEstimate,
    CarbonBaseline,
    SocMeasure,
    CobenefitRating,
    CobenefitMetadata,
}

/// What a failed call does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the whole aggregation
    Fatal,
    /// Carry on without this call's contribution
    Degrade,
}

impl ProviderCall {
    pub const fn policy(self) -> FailurePolicy {
        match self {
            ProviderCall::Jurisdiction => FailurePolicy::Degrade,
            ProviderCall::ErfBatch => FailurePolicy::Fatal,
            ProviderCall::SubAreaList => FailurePolicy::Fatal,
            ProviderCall::SubAreaEstimate => FailurePolicy::Degrade,
            ProviderCall::CarbonBaseline => FailurePolicy::Fatal,
            ProviderCall::SocMeasure => FailurePolicy::Degrade,
            ProviderCall::CobenefitRating => FailurePolicy::Degrade,
            ProviderCall::CobenefitMetadata => FailurePolicy::Degrade,
        }
    }

    /// Result of a call the run cannot continue without
    pub fn require<T>(self, result: Result<T, ClientError>) -> Result<T, EstimateError> {
        debug_assert_eq!(self.policy(), FailurePolicy::Fatal);
        result.map_err(|source| EstimateError::Provider { call: self, source })
    }

    /// Apply this call's failure policy to its result
    pub fn settle<T>(self, result: Result<T, ClientError>) -> Result<Option<T>, EstimateError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(source) => match self.policy() {
                FailurePolicy::Fatal => Err(EstimateError::Provider { call: self, source }),
                FailurePolicy::Degrade => {
                    warn!(call = %self, error = %source, "provider call failed, continuing without it");
                    Ok(None)
                }
            },
        }
    }
}

impl fmt::Display for ProviderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderCall::Jurisdiction => "jurisdiction check",
            ProviderCall::ErfBatch => "ERF estimate",
            ProviderCall::SubAreaList => "SA2 lookup",
            ProviderCall::SubAreaEstimate => "SA2 soil estimate",
            ProviderCall::CarbonBaseline => "soil carbon baseline",
            ProviderCall::SocMeasure => "SOC measure estimate",
            ProviderCall::CobenefitRating => "LRF rating",
            ProviderCall::CobenefitMetadata => "ERF co-benefits",
        };
        f.write_str(name)
    }
}

/// Result of one aggregation run, not yet persisted
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// `id` is unset until stored
    pub baseline: BaselineEstimate,
    pub estimates: BTreeMap<String, MethodEstimate>,
}

/// Run every provider call for a project area and merge the results
pub fn aggregate<P>(
    provider: &P,
    asset_id: i64,
    area: &ProjectArea,
    metadata: &ProjectMetadata,
    now: i64,
) -> Result<Aggregation, EstimateError>
where
    P: EstimationProvider + ?Sized,
{
    // Unknown jurisdiction is treated as outside Queensland
    let in_qld = ProviderCall::Jurisdiction
        .settle(provider.in_qld(area))?
        .unwrap_or(false);

    // ERF vegetation methods, one batch call for all of them
    let erf_payload =
        ProviderCall::ErfBatch.require(provider.erf_estimates(area, metadata.project_length))?;
    let mut partials = parse_erf_payload(&erf_payload);
    info!(methods = partials.len(), "parsed ERF estimates");

    // Soil project types, summed across SA2 sub-areas. ERF wins on a name clash.
    let sub_areas = ProviderCall::SubAreaList.require(provider.sub_areas(area))?;
    let soil = soil_estimates(provider, &sub_areas, metadata)?;
    info!(sub_areas = sub_areas.len(), project_types = soil.len(), "merged soil estimates");
    for (project_type, estimate) in soil {
        partials.entry(project_type).or_insert(estimate);
    }

    // Measured carbon baseline for the parcel
    let carbon = ProviderCall::CarbonBaseline.require(provider.carbon_estimate(area))?;
    let bulk_density = round_to(carbon.bulk_density_average, 2);
    let carbon_average = round_to(carbon.carbon_average, 1);
    let carbon_target = round_to(carbon_average + round_to(metadata.carbon_improvement, 1), 1);

    let request = SocRequest {
        land_area: carbon.polygon_area,
        carbon_current: carbon_average,
        carbon_target,
        bulk_density,
        depth: SOC_DEPTH_CM,
        project_length: metadata.project_length,
    };
    // SOC estimate for the target, which also fixes the change-rate
    let mut change_rate = ChangeRate::Unavailable;
    if let Some(soc) = ProviderCall::SocMeasure.settle(provider.soc_estimate(&request))? {
        change_rate = derive_change_rate(soc.annual, carbon_average, carbon_target);
        partials
            .entry(SOC_MEASURE_METHOD.to_string())
            .or_insert(PartialEstimate {
                annual: Some(soc.annual),
                project: Some(soc.project),
                ..PartialEstimate::default()
            });
    }

    let mut estimates = complete_estimates(partials);

    // LRF ratings only apply in Queensland
    if in_qld {
        let mut ratings = BTreeMap::new();
        for method_id in estimates.keys() {
            let rating = ProviderCall::CobenefitRating.settle(provider.lrf_rating(area, method_id))?;
            if let Some(rating) = rating {
                ratings.insert(method_id.clone(), rating);
            }
        }
        estimates = attach_ratings(estimates, &ratings);
    }

    let warning_message = if carbon.warning_messages.is_empty() {
        None
    } else {
        Some(carbon.warning_messages.join("\n"))
    };

    Ok(Aggregation {
        baseline: BaselineEstimate {
            id: 0,
            asset_id,
            timestamp: now,
            project_length: metadata.project_length,
            new_irrigation: metadata.new_irrigation,
            polygon_area: carbon.polygon_area,
            bulk_density_average: bulk_density,
            carbon_average,
            carbon_target,
            warning_message,
            selected_method: None,
            change_rate,
        },
        estimates,
    })
}

/// Soil estimates for every SA2, requested in parallel and summed per project type.
/// A failed sub-area contributes nothing.
fn soil_estimates<P>(
    provider: &P,
    sub_areas: &[SubArea],
    metadata: &ProjectMetadata,
) -> Result<BTreeMap<String, PartialEstimate>, EstimateError>
where
    P: EstimationProvider + ?Sized,
{
    let totals = sub_areas
        .par_iter()
        .map(|sub_area| {
            let request = soil_request(sub_area, metadata);
            ProviderCall::SubAreaEstimate.settle(provider.soil_estimate(&request))
        })
        .try_fold(SoilTotals::new, |totals, settled| {
            settled.map(|estimates| match estimates {
                Some(estimates) => totals.absorb(&estimates),
                None => totals,
            })
        })
        .try_reduce(SoilTotals::new, |a, b| Ok(a.combine(b)))?;
    Ok(totals.finish())
}

/// The provider takes whole hectares; fractions are truncated
fn soil_request(sub_area: &SubArea, metadata: &ProjectMetadata) -> SoilRequest {
    SoilRequest {
        sa2: sub_area.sa2,
        land_area: sub_area.area.trunc() as i64,
        project_types: metadata.project_types.clone(),
        new_irrigation: metadata.new_irrigation,
    }
}

/// Keep only methods that have both an annual and a project figure
pub fn complete_estimates(
    partials: BTreeMap<String, PartialEstimate>,
) -> BTreeMap<String, MethodEstimate> {
    partials
        .into_iter()
        .filter_map(|(method_id, partial)| {
            let estimate = partial.complete(&method_id);
            if estimate.is_none() {
                info!(method = %method_id, "dropping incomplete estimate");
            }
            estimate.map(|e| (method_id, e))
        })
        .collect()
}

/// Merge provider ratings into the estimates they belong to. Ratings for
/// methods not in `estimates` and keys outside the fixed categories are dropped.
pub fn attach_ratings(
    estimates: BTreeMap<String, MethodEstimate>,
    ratings: &BTreeMap<String, BTreeMap<String, f64>>,
) -> BTreeMap<String, MethodEstimate> {
    estimates
        .into_iter()
        .map(|(method_id, mut estimate)| {
            if let Some(rating) = ratings.get(&method_id) {
                let mapped: RatingSet = rating
                    .iter()
                    .filter_map(|(key, value)| {
                        RatingCategory::from_provider_key(key).map(|category| (category, *value))
                    })
                    .collect();
                if !mapped.is_empty() {
                    estimate.cobenefit_ratings = Some(mapped);
                }
            }
            (method_id, estimate)
        })
        .collect()
}

/// Store an aggregation, replacing the asset's baseline and its method rows
pub fn persist(conn: &Connection, aggregation: &Aggregation) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let estimate_id = db::upsert_baseline(&tx, &aggregation.baseline)?;
    for estimate in aggregation.estimates.values() {
        db::upsert_method_estimate(&tx, estimate_id, estimate)?;
    }
    tx.commit()?;
    info!(
        estimate_id,
        asset_id = aggregation.baseline.asset_id,
        methods = aggregation.estimates.len(),
        "stored estimate"
    );
    Ok(estimate_id)
}

/// Confirm new carbon inputs with a real SOC call, replacing the provisional
/// preview. The change-rate is re-derived from the fresh figure; if the call
/// fails the stored estimate and rate are left as they were.
pub fn commit_carbon_update<P>(
    conn: &Connection,
    provider: &P,
    estimate_id: i64,
    carbon_average: f64,
    carbon_target: f64,
) -> Result<Option<MethodEstimate>>
where
    P: EstimationProvider + ?Sized,
{
    let baseline = db::get_baseline(conn, estimate_id)?
        .ok_or_else(|| anyhow!("estimate {} not found", estimate_id))?;

    // Area and bulk density stay as measured; only the carbon inputs change
    let request = SocRequest {
        land_area: baseline.polygon_area,
        carbon_current: carbon_average,
        carbon_target,
        bulk_density: baseline.bulk_density_average,
        depth: SOC_DEPTH_CM,
        project_length: baseline.project_length,
    };
    let soc = ProviderCall::SocMeasure
        .settle(provider.soc_estimate(&request))
        .context("SOC estimate failed")?;

    let tx = conn.unchecked_transaction()?;
    let mut updated = None;
    if let Some(soc) = soc {
        // Ratings depend on the area, not the carbon figures
        let previous_ratings = db::list_method_estimates(&tx, estimate_id)?
            .into_iter()
            .find(|m| m.method_id == SOC_MEASURE_METHOD)
            .and_then(|m| m.cobenefit_ratings);
        let estimate = MethodEstimate {
            method_id: SOC_MEASURE_METHOD.to_string(),
            annual: soc.annual,
            project_total: soc.project,
            warning_message: None,
            cobenefit_ratings: previous_ratings,
        };
        db::upsert_method_estimate(&tx, estimate_id, &estimate)?;
        db::set_change_rate(
            &tx,
            estimate_id,
            derive_change_rate(soc.annual, carbon_average, carbon_target),
        )?;
        updated = Some(estimate);
    }
    // Carbon values are kept even when the provider could not confirm them
    db::update_carbon_values(&tx, estimate_id, carbon_average, carbon_target)?;
    tx.commit()?;

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CarbonBaseline, SocEstimate, SoilProjectEstimate};
    use crate::cobenefits::ErfCobenefits;
    use approx::assert_relative_eq;
    use serde_json::{Map, Value, json};
    use std::sync::Mutex;

    fn failure<T>() -> Result<T, ClientError> {
        Err(ClientError::Provider {
            status: "\"error\"".to_string(),
        })
    }

    struct FakeProvider {
        in_qld: Option<bool>,
        erf: Option<Value>,
        sub_areas: Option<Vec<SubArea>>,
        soil: BTreeMap<i64, Vec<SoilProjectEstimate>>,
        carbon: Option<CarbonBaseline>,
        soc_per_percent: Option<f64>,
        ratings: BTreeMap<String, BTreeMap<String, f64>>,
        soc_requests: Mutex<Vec<SocRequest>>,
    }

    impl Default for FakeProvider {
        fn default() -> Self {
            let soil = BTreeMap::from([
                (101, vec![soil("typeA", 10.0, 100.0)]),
                (102, vec![soil("typeA", 5.0, 50.0)]),
            ]);
            Self {
                in_qld: Some(false),
                erf: Some(json!({
                    "acnvAnnual": 120.0,
                    "acnvProject": 3000.0,
                    "hirAnnual": 40.0,
                    "projectWarnings": [{ "method": "acnv", "warnings": ["Check clearing permit"] }]
                })),
                sub_areas: Some(vec![
                    SubArea { sa2: 101, area: 30.0 },
                    SubArea { sa2: 102, area: 12.4 },
                ]),
                soil,
                carbon: Some(CarbonBaseline {
                    polygon_area: 42.4,
                    bulk_density_average: 1.314,
                    carbon_average: 1.23,
                    warning_messages: vec!["Sparse samples".to_string()],
                }),
                soc_per_percent: Some(1000.0),
                ratings: BTreeMap::new(),
                soc_requests: Mutex::new(Vec::new()),
            }
        }
    }

    fn soil(project_type: &str, annual: f64, total: f64) -> SoilProjectEstimate {
        SoilProjectEstimate {
            project_type: project_type.to_string(),
            annual,
            total,
        }
    }

    impl EstimationProvider for FakeProvider {
        fn erf_estimates(&self, _: &ProjectArea, _: u32) -> Result<Map<String, Value>, ClientError> {
            match &self.erf {
                Some(Value::Object(map)) => Ok(map.clone()),
                _ => failure(),
            }
        }

        fn sub_areas(&self, _: &ProjectArea) -> Result<Vec<SubArea>, ClientError> {
            self.sub_areas.clone().map_or_else(failure, Ok)
        }

        fn soil_estimate(&self, request: &SoilRequest) -> Result<Vec<SoilProjectEstimate>, ClientError> {
            self.soil.get(&request.sa2).cloned().map_or_else(failure, Ok)
        }

        fn carbon_estimate(&self, _: &ProjectArea) -> Result<CarbonBaseline, ClientError> {
            self.carbon.clone().map_or_else(failure, Ok)
        }

        fn soc_estimate(&self, request: &SocRequest) -> Result<SocEstimate, ClientError> {
            self.soc_requests.lock().unwrap().push(request.clone());
            let Some(per_percent) = self.soc_per_percent else {
                return failure();
            };
            let annual = per_percent * (request.carbon_target - request.carbon_current);
            Ok(SocEstimate {
                annual,
                project: annual * f64::from(request.project_length),
            })
        }

        fn in_qld(&self, _: &ProjectArea) -> Result<bool, ClientError> {
            self.in_qld.map_or_else(failure, Ok)
        }

        fn lrf_rating(&self, _: &ProjectArea, method_id: &str) -> Result<BTreeMap<String, f64>, ClientError> {
            self.ratings.get(method_id).cloned().map_or_else(failure, Ok)
        }

        fn erf_cobenefits(&self, _: &str) -> Result<ErfCobenefits, ClientError> {
            failure()
        }

        fn ping(&self) -> Result<bool, ClientError> {
            Ok(true)
        }
    }

    fn area() -> ProjectArea {
        ProjectArea::new(vec![
            crate::models::LatLng { lat: -27.5, lng: 153.0 },
            crate::models::LatLng { lat: -27.4, lng: 153.1 },
        ])
        .unwrap()
    }

    fn metadata() -> ProjectMetadata {
        ProjectMetadata {
            project_types: vec!["typeA".to_string()],
            carbon_improvement: 0.5,
            ..ProjectMetadata::default()
        }
    }

    fn run(provider: &FakeProvider) -> Result<Aggregation, EstimateError> {
        aggregate(provider, 7, &area(), &metadata(), 1_700_000_000)
    }

    fn qld_ratings() -> BTreeMap<String, BTreeMap<String, f64>> {
        let rating = BTreeMap::from([
            ("greatBarrierReef".to_string(), 4.0),
            ("wetlands".to_string(), 2.0),
            ("summary".to_string(), 3.0),
            ("someNewCategory".to_string(), 5.0),
        ]);
        ["acnv", "typeA", SOC_MEASURE_METHOD, "hir"]
            .into_iter()
            .map(|m| (m.to_string(), rating.clone()))
            .collect()
    }

    #[test]
    fn end_to_end_merges_every_method_family() {
        let aggregation = run(&FakeProvider::default()).unwrap();
        let estimates = &aggregation.estimates;

        let ids: Vec<&str> = estimates.keys().map(String::as_str).collect();
        assert_eq!(ids, ["acnv", SOC_MEASURE_METHOD, "typeA"]);

        assert_relative_eq!(estimates["typeA"].annual, 15.0);
        assert_relative_eq!(estimates["typeA"].project_total, 150.0);
        assert_eq!(
            estimates["acnv"].warning_message.as_deref(),
            Some("Check clearing permit")
        );
        assert!(estimates.values().all(|e| e.cobenefit_ratings.is_none()));
    }

    #[test]
    fn baseline_uses_rounded_carbon_inputs() {
        let provider = FakeProvider::default();
        let aggregation = run(&provider).unwrap();
        let baseline = &aggregation.baseline;

        assert_relative_eq!(baseline.bulk_density_average, 1.31);
        assert_relative_eq!(baseline.carbon_average, 1.2);
        assert_relative_eq!(baseline.carbon_target, 1.7);
        assert_eq!(baseline.warning_message.as_deref(), Some("Sparse samples"));
        assert_relative_eq!(baseline.change_rate.as_option().unwrap(), 1000.0, epsilon = 1e-6);

        let requests = provider.soc_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].depth, SOC_DEPTH_CM);
        assert_eq!(requests[0].project_length, 25);
    }

    #[test]
    fn partial_methods_are_excluded() {
        let aggregation = run(&FakeProvider::default()).unwrap();
        assert!(!aggregation.estimates.contains_key("hir"));
    }

    #[test]
    fn jurisdiction_failure_only_drops_ratings() {
        let provider = FakeProvider {
            in_qld: None,
            ratings: qld_ratings(),
            ..FakeProvider::default()
        };
        let aggregation = run(&provider).unwrap();
        assert_eq!(aggregation.estimates.len(), 3);
        assert!(aggregation.estimates.values().all(|e| e.cobenefit_ratings.is_none()));
    }

    #[test]
    fn queensland_projects_get_mapped_ratings() {
        let provider = FakeProvider {
            in_qld: Some(true),
            ratings: qld_ratings(),
            ..FakeProvider::default()
        };
        let aggregation = run(&provider).unwrap();

        for estimate in aggregation.estimates.values() {
            let ratings = estimate.cobenefit_ratings.as_ref().unwrap();
            assert_eq!(ratings.len(), 3);
            assert_eq!(ratings[&RatingCategory::GreatBarrierReef], 4.0);
            assert_eq!(ratings[&RatingCategory::Summary], 3.0);
        }
        assert!(aggregation.estimates[SOC_MEASURE_METHOD].cobenefit_ratings.is_some());
    }

    #[test]
    fn failed_rating_lookup_degrades_per_method() {
        let mut ratings = qld_ratings();
        ratings.remove("typeA");
        let provider = FakeProvider {
            in_qld: Some(true),
            ratings,
            ..FakeProvider::default()
        };
        let aggregation = run(&provider).unwrap();
        assert!(aggregation.estimates["typeA"].cobenefit_ratings.is_none());
        assert!(aggregation.estimates["acnv"].cobenefit_ratings.is_some());
    }

    #[test]
    fn erf_failure_is_fatal() {
        let provider = FakeProvider {
            erf: None,
            ..FakeProvider::default()
        };
        assert!(matches!(
            run(&provider),
            Err(EstimateError::Provider { call: ProviderCall::ErfBatch, .. })
        ));
    }

    #[test]
    fn sub_area_list_failure_is_fatal() {
        let provider = FakeProvider {
            sub_areas: None,
            ..FakeProvider::default()
        };
        assert!(matches!(
            run(&provider),
            Err(EstimateError::Provider { call: ProviderCall::SubAreaList, .. })
        ));
    }

    #[test]
    fn single_sub_area_failure_degrades() {
        let mut provider = FakeProvider::default();
        provider.soil.remove(&102);
        let aggregation = run(&provider).unwrap();
        assert_relative_eq!(aggregation.estimates["typeA"].annual, 10.0);
        assert_relative_eq!(aggregation.estimates["typeA"].project_total, 100.0);
    }

    #[test]
    fn carbon_baseline_failure_is_fatal() {
        let provider = FakeProvider {
            carbon: None,
            ..FakeProvider::default()
        };
        assert!(matches!(
            run(&provider),
            Err(EstimateError::Provider { call: ProviderCall::CarbonBaseline, .. })
        ));
    }

    #[test]
    fn soc_failure_leaves_rate_unavailable() {
        let provider = FakeProvider {
            soc_per_percent: None,
            ..FakeProvider::default()
        };
        let aggregation = run(&provider).unwrap();
        assert!(!aggregation.estimates.contains_key(SOC_MEASURE_METHOD));
        assert_eq!(aggregation.baseline.change_rate, ChangeRate::Unavailable);
    }

    #[test]
    fn zero_improvement_has_no_rate() {
        let provider = FakeProvider::default();
        let metadata = ProjectMetadata {
            carbon_improvement: 0.0,
            ..metadata()
        };
        let aggregation = aggregate(&provider, 7, &area(), &metadata, 0).unwrap();
        assert_eq!(aggregation.baseline.change_rate, ChangeRate::Unavailable);
    }

    #[test]
    fn attach_ratings_ignores_absent_methods_and_unknown_keys() {
        let estimates = BTreeMap::from([(
            "acnv".to_string(),
            MethodEstimate {
                method_id: "acnv".to_string(),
                annual: 1.0,
                project_total: 25.0,
                warning_message: None,
                cobenefit_ratings: None,
            },
        )]);
        let ratings = BTreeMap::from([
            (
                "acnv".to_string(),
                BTreeMap::from([("someNewCategory".to_string(), 1.0)]),
            ),
            (
                "ghost".to_string(),
                BTreeMap::from([("summary".to_string(), 2.0)]),
            ),
        ]);

        let attached = attach_ratings(estimates, &ratings);
        assert_eq!(attached.len(), 1);
        assert!(attached["acnv"].cobenefit_ratings.is_none());
    }

    #[test]
    fn policy_table() {
        assert_eq!(ProviderCall::ErfBatch.policy(), FailurePolicy::Fatal);
        assert_eq!(ProviderCall::SubAreaList.policy(), FailurePolicy::Fatal);
        assert_eq!(ProviderCall::CarbonBaseline.policy(), FailurePolicy::Fatal);
        assert_eq!(ProviderCall::Jurisdiction.policy(), FailurePolicy::Degrade);
        assert_eq!(ProviderCall::SubAreaEstimate.policy(), FailurePolicy::Degrade);
        assert_eq!(ProviderCall::CobenefitRating.policy(), FailurePolicy::Degrade);
        assert!(ProviderCall::Jurisdiction.settle::<bool>(failure()).unwrap().is_none());
        assert!(ProviderCall::ErfBatch.settle::<bool>(failure()).is_err());
        assert!(matches!(
            ProviderCall::CarbonBaseline.require::<bool>(failure()),
            Err(EstimateError::Provider { call: ProviderCall::CarbonBaseline, .. })
        ));
    }

    #[test]
    fn sub_area_land_area_is_truncated() {
        let sub_area = SubArea { sa2: 101, area: 12.9 };
        let request = soil_request(&sub_area, &metadata());
        assert_eq!(request.land_area, 12);
        assert_eq!(request.sa2, 101);
        assert_eq!(request.project_types, ["typeA"]);
    }

    #[test]
    fn persisted_run_can_be_committed_later() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let provider = FakeProvider {
            in_qld: Some(true),
            ratings: qld_ratings(),
            ..FakeProvider::default()
        };

        let aggregation = run(&provider).unwrap();
        let id = persist(&conn, &aggregation).unwrap();
        assert_eq!(persist(&conn, &aggregation).unwrap(), id);
        assert_eq!(db::list_method_estimates(&conn, id).unwrap().len(), 3);

        let updated = commit_carbon_update(&conn, &provider, id, 1.0, 3.0)
            .unwrap()
            .unwrap();
        assert_relative_eq!(updated.annual, 2000.0);
        assert!(updated.cobenefit_ratings.is_some());

        let baseline = db::get_baseline(&conn, id).unwrap().unwrap();
        assert_relative_eq!(baseline.carbon_target, 3.0);
        assert_relative_eq!(baseline.change_rate.as_option().unwrap(), 1000.0);

        let stored = db::list_method_estimates(&conn, id).unwrap();
        assert_eq!(stored[0].method_id, SOC_MEASURE_METHOD);
        assert_relative_eq!(stored[0].annual, 2000.0);
    }

    #[test]
    fn failed_commit_keeps_previous_rate() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let id = persist(&conn, &run(&FakeProvider::default()).unwrap()).unwrap();

        let offline = FakeProvider {
            soc_per_percent: None,
            ..FakeProvider::default()
        };
        assert!(commit_carbon_update(&conn, &offline, id, 1.0, 3.0).unwrap().is_none());

        let baseline = db::get_baseline(&conn, id).unwrap().unwrap();
        assert_relative_eq!(baseline.carbon_average, 1.0);
        assert_relative_eq!(baseline.change_rate.as_option().unwrap(), 1000.0, epsilon = 1e-6);
    }
}
