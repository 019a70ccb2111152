//! ERF method co-benefit metadata and method display names

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::aggregator::ProviderCall;
use crate::client::EstimationProvider;
use crate::config::COBENEFIT_CACHE_TTL_S;
use crate::db;

/// ERF methods the provider publishes co-benefit metadata for
pub const ERF_METHODS: [&str; 3] = ["avoidedclearing", "envplantings", "hir"];

static CAPITAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cobenefit {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Rating")]
    pub rating: Value,
}

/// Co-benefits for one ERF method, grouped by type (e.g. "Farm Profitability")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErfCobenefits {
    #[serde(rename = "methodName")]
    pub method_name: String,
    #[serde(rename = "co-benefit", default)]
    pub cobenefits: BTreeMap<String, BTreeMap<String, Cobenefit>>,
}

impl fmt::Display for ErfCobenefits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.method_name)?;
        for (type_label, benefits) in &self.cobenefits {
            let header = if type_label == "Disbenefits" {
                "Disbenefits"
            } else {
                "Co-benefits"
            };
            writeln!(f)?;
            writeln!(f, "{}", type_label)?;
            writeln!(f, "  {:<30} {:<8} {}", header, "Rating", "Description")?;
            for (label, benefit) in benefits {
                let rating = match &benefit.rating {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                writeln!(f, "  {:<30} {:<8} {}", label, rating, benefit.description)?;
            }
        }
        Ok(())
    }
}

/// ERF payload ids that are published under a different co-benefit id
pub fn canonical_method(method_id: &str) -> &str {
    match method_id {
        "acnv" => "avoidedclearing",
        "emp" => "envplantings",
        other => other,
    }
}

/// `soilCarbon` -> `soil Carbon`
pub fn spaced_method_id(method_id: &str) -> String {
    CAPITAL_RE.replace_all(method_id, " $0").into_owned()
}

/// Co-benefit metadata for every known ERF method
#[derive(Debug, Default)]
pub struct CobenefitCatalog {
    entries: BTreeMap<String, ErfCobenefits>,
}

impl CobenefitCatalog {
    /// Read fresh entries from the cache, fetching any that are missing or
    /// expired when a provider is available.
    pub fn load<P>(conn: &Connection, provider: Option<&P>, now: i64) -> Result<Self>
    where
        P: EstimationProvider + ?Sized,
    {
        let mut entries = BTreeMap::new();

        for method in ERF_METHODS {
            if let Some(payload) = db::cached_cobenefits(conn, method, now)? {
                match serde_json::from_str::<ErfCobenefits>(&payload) {
                    Ok(cobenefits) => {
                        entries.insert(method.to_string(), cobenefits);
                        continue;
                    }
                    Err(e) => debug!(method, error = %e, "discarding unreadable cache entry"),
                }
            }

            // Missing or expired; refetch when we can
            let Some(provider) = provider else { continue };
            let fetched = ProviderCall::CobenefitMetadata.settle(provider.erf_cobenefits(method));
            if let Ok(Some(cobenefits)) = fetched {
                info!(method, "cached ERF co-benefits");
                let payload = serde_json::to_string(&cobenefits)?;
                db::store_cobenefits(conn, method, &payload, now + COBENEFIT_CACHE_TTL_S)?;
                entries.insert(method.to_string(), cobenefits);
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, method_id: &str) -> Option<&ErfCobenefits> {
        self.entries.get(canonical_method(method_id))
    }

    /// Published method name when known, else the id split on capitals
    pub fn display_name(&self, method_id: &str) -> String {
        match self.get(method_id) {
            Some(cobenefits) => cobenefits.method_name.clone(),
            None => spaced_method_id(method_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envplantings() -> ErfCobenefits {
        serde_json::from_value(json!({
            "methodName": "Environmental Plantings",
            "co-benefit": {
                "Farm Profitability": {
                    "Shade and shelter": { "Description": "Reduces stock heat stress", "Rating": "High" }
                },
                "Disbenefits": {
                    "Land use change": { "Description": "Removes grazing land", "Rating": 2 }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn aliases_resolve_to_published_ids() {
        assert_eq!(canonical_method("acnv"), "avoidedclearing");
        assert_eq!(canonical_method("emp"), "envplantings");
        assert_eq!(canonical_method("soc-measure"), "soc-measure");
    }

    #[test]
    fn unknown_methods_are_split_on_capitals() {
        assert_eq!(spaced_method_id("soilCarbonPasture"), "soil Carbon Pasture");
        assert_eq!(spaced_method_id("hir"), "hir");
    }

    #[test]
    fn display_name_prefers_metadata() {
        let mut catalog = CobenefitCatalog::default();
        catalog
            .entries
            .insert("envplantings".to_string(), envplantings());

        assert_eq!(catalog.display_name("emp"), "Environmental Plantings");
        assert_eq!(catalog.display_name("newPasture"), "new Pasture");
    }

    #[test]
    fn disbenefits_get_their_own_header() {
        let text = envplantings().to_string();
        assert!(text.contains("Disbenefits"));
        assert!(text.contains("Co-benefits"));
        assert!(text.contains("Shade and shelter"));
    }

    #[test]
    fn cached_entries_are_used_without_provider() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let payload = serde_json::to_string(&envplantings()).unwrap();
        db::store_cobenefits(&conn, "envplantings", &payload, 2_000).unwrap();

        let catalog =
            CobenefitCatalog::load::<crate::client::LooccClient>(&conn, None, 1_000).unwrap();
        assert!(catalog.get("emp").is_some());

        let expired =
            CobenefitCatalog::load::<crate::client::LooccClient>(&conn, None, 3_000).unwrap();
        assert!(expired.get("emp").is_none());
    }
}
