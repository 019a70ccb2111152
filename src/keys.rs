//! Decoding of the flat ERF response keys
//!
//! `veg/all` answers with keys such as `acnvAnnual` or `hirProject`, plus a
//! `projectWarnings` list. These are folded into one partial estimate per
//! method id.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{Interval, PartialEstimate};

/// Reserved key holding per-method warnings
pub const PROJECT_WARNINGS_KEY: &str = "projectWarnings";

static ESTIMATE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)(Annual|Project)$").expect("static regex"));

#[derive(Debug, Deserialize)]
struct ProjectWarning {
    method: String,
    #[serde(default)]
    warnings: Vec<String>,
}

/// Split `acnvAnnual` into (`acnv`, Annual). Keys without a recognised
/// suffix, or with nothing before it, yield `None`.
pub fn parse_estimate_key(key: &str) -> Option<(String, Interval)> {
    let cap = ESTIMATE_KEY_RE.captures(key)?;
    let interval = match &cap[2] {
        "Annual" => Interval::Annual,
        _ => Interval::Project,
    };
    Some((cap[1].to_lowercase(), interval))
}

/// Fold an ERF payload into partial estimates keyed by method id
pub fn parse_erf_payload(payload: &Map<String, Value>) -> BTreeMap<String, PartialEstimate> {
    let mut estimates: BTreeMap<String, PartialEstimate> = BTreeMap::new();

    for (key, value) in payload {
        if key == PROJECT_WARNINGS_KEY {
            merge_warnings(&mut estimates, value);
            continue;
        }

        let Some((method_id, interval)) = parse_estimate_key(key) else {
            debug!(key = %key, "ignoring unrecognised ERF key");
            continue;
        };
        let Some(figure) = value.as_f64() else {
            debug!(key = %key, "ignoring non-numeric ERF value");
            continue;
        };
        estimates.entry(method_id).or_default().set(interval, figure);
    }

    estimates
}

fn merge_warnings(estimates: &mut BTreeMap<String, PartialEstimate>, value: &Value) {
    let warnings: Vec<ProjectWarning> = match serde_json::from_value(value.clone()) {
        Ok(warnings) => warnings,
        Err(e) => {
            debug!(error = %e, "ignoring malformed project warnings");
            return;
        }
    };

    for warning in warnings {
        if warning.warnings.is_empty() {
            continue;
        }
        let joined = warning.warnings.join("\n");
        // a method can appear more than once
        let entry = estimates.entry(warning.method.to_lowercase()).or_default();
        entry.warning_message = Some(match entry.warning_message.take() {
            Some(existing) => format!("{}\n{}", existing, joined),
            None => joined,
        });
    }
}
