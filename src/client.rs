//! HTTP client for the LOOC-C carbon estimation API
//!
//! Every operation returns `Err(ClientError)` rather than panicking when the
//! provider is unreachable, answers with a `status` field, or omits a field we
//! need. Whether that failure is fatal is decided by the caller.

use std::collections::BTreeMap;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::cobenefits::ErfCobenefits;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::ProjectArea;

/// A statistical sub-area (SA2) intersecting the parcel
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubArea {
    pub sa2: i64,
    pub area: f64,
}

/// One soil project type's figures for a single sub-area
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SoilProjectEstimate {
    #[serde(rename = "projectType")]
    pub project_type: String,
    #[serde(rename = "annualSequestrationRate")]
    pub annual: f64,
    #[serde(rename = "totalSequesteredOverProject")]
    pub total: f64,
}

/// Parameters for a per-sub-area soil estimate
#[derive(Debug, Clone, Serialize)]
pub struct SoilRequest {
    pub sa2: i64,
    #[serde(rename = "landArea")]
    pub land_area: i64,
    #[serde(rename = "projectTypes")]
    pub project_types: Vec<String>,
    #[serde(rename = "newIrrigation")]
    pub new_irrigation: bool,
}

/// Measured soil properties for the whole parcel
#[derive(Debug, Clone, PartialEq)]
pub struct CarbonBaseline {
    pub polygon_area: f64,
    pub bulk_density_average: f64,
    pub carbon_average: f64,
    pub warning_messages: Vec<String>,
}

/// Parameters for a measured soil organic carbon estimate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocRequest {
    #[serde(rename = "landArea")]
    pub land_area: f64,
    #[serde(rename = "carbonCurrent")]
    pub carbon_current: f64,
    #[serde(rename = "carbonTarget")]
    pub carbon_target: f64,
    #[serde(rename = "bulkDensity")]
    pub bulk_density: f64,
    pub depth: u32,
    #[serde(rename = "projectLength")]
    pub project_length: u32,
}

/// Annual and whole-project CO2e for a SOC scenario
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocEstimate {
    pub annual: f64,
    pub project: f64,
}

/// Operations offered by the estimation provider
pub trait EstimationProvider: Sync {
    /// Raw `veg/all` payload, keyed by `<method><Annual|Project>`
    fn erf_estimates(
        &self,
        area: &ProjectArea,
        project_length: u32,
    ) -> Result<Map<String, Value>, ClientError>;

    fn sub_areas(&self, area: &ProjectArea) -> Result<Vec<SubArea>, ClientError>;

    fn soil_estimate(&self, request: &SoilRequest) -> Result<Vec<SoilProjectEstimate>, ClientError>;

    fn carbon_estimate(&self, area: &ProjectArea) -> Result<CarbonBaseline, ClientError>;

    fn soc_estimate(&self, request: &SocRequest) -> Result<SocEstimate, ClientError>;

    /// Whether the parcel lies in Queensland, where LRF ratings apply
    fn in_qld(&self, area: &ProjectArea) -> Result<bool, ClientError>;

    /// Provider rating keys with their numeric scores
    fn lrf_rating(
        &self,
        area: &ProjectArea,
        method_id: &str,
    ) -> Result<BTreeMap<String, f64>, ClientError>;

    fn erf_cobenefits(&self, method_id: &str) -> Result<ErfCobenefits, ClientError>;

    fn ping(&self) -> Result<bool, ClientError>;
}

/// Any payload carrying a `status` field counts as a failure, whatever its value
pub fn reject_status(body: &Value) -> Result<(), ClientError> {
    match body.get("status") {
        Some(status) => Err(ClientError::Provider {
            status: status.to_string(),
        }),
        None => Ok(()),
    }
}

fn field<'a>(body: &'a Value, name: &'static str) -> Result<&'a Value, ClientError> {
    body.get(name).ok_or(ClientError::MissingField(name))
}

fn expect_object(body: Value, expected: &'static str) -> Result<Map<String, Value>, ClientError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ClientError::UnexpectedShape(expected)),
    }
}

fn number(body: &Value, name: &'static str) -> Result<f64, ClientError> {
    field(body, name)?
        .as_f64()
        .ok_or(ClientError::MissingField(name))
}

/// Blocking reqwest client authenticated with an API key
pub struct LooccClient {
    http: Client,
    base_uri: String,
    api_key: String,
}

impl LooccClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_uri: config.base_uri.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_uri, path)
    }

    /// POST a JSON body and decode the reply, whatever its HTTP status
    fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value, ClientError> {
        debug!(path, "POST");
        let response = self
            .http
            .post(self.url(path))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()?;
        // Failures arrive as a JSON body with `status`, so the HTTP code is not checked
        let value: Value = response.json()?;
        reject_status(&value)?;
        Ok(value)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ClientError> {
        debug!(path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .header("x-api-key", &self.api_key)
            .query(query)
            .send()?;
        let value: Value = response.json()?;
        reject_status(&value)?;
        Ok(value)
    }
}

impl EstimationProvider for LooccClient {
    fn erf_estimates(
        &self,
        area: &ProjectArea,
        project_length: u32,
    ) -> Result<Map<String, Value>, ClientError> {
        let body = json!({ "projectArea": area, "projectLength": project_length });
        expect_object(self.post("veg/all", &body)?, "an object of ERF estimates")
    }

    fn sub_areas(&self, area: &ProjectArea) -> Result<Vec<SubArea>, ClientError> {
        let body = self.post("soil/sa2", area)?;
        Ok(serde_json::from_value(field(&body, "areas")?.clone())?)
    }

    fn soil_estimate(&self, request: &SoilRequest) -> Result<Vec<SoilProjectEstimate>, ClientError> {
        let body = self.post("soil/estimate", request)?;
        Ok(serde_json::from_value(field(&body, "estimates")?.clone())?)
    }

    fn carbon_estimate(&self, area: &ProjectArea) -> Result<CarbonBaseline, ClientError> {
        let body = self.post("soil/direct", area)?;
        // warnings are optional
        let warning_messages = match body.get("warningMessages") {
            Some(messages) => serde_json::from_value(messages.clone())?,
            None => Vec::new(),
        };
        Ok(CarbonBaseline {
            polygon_area: number(&body, "polygonArea")?,
            bulk_density_average: number(&body, "polygonBDAverage")?,
            carbon_average: number(&body, "polygonOCPercAverage")?,
            warning_messages,
        })
    }

    fn soc_estimate(&self, request: &SocRequest) -> Result<SocEstimate, ClientError> {
        let body = self.post("soil/measure", request)?;
        Ok(SocEstimate {
            annual: number(&body, "totalCO2ePolyYr")?,
            project: number(&body, "totalCO2ePolyProject")?,
        })
    }

    fn in_qld(&self, area: &ProjectArea) -> Result<bool, ClientError> {
        let body = self.post("lrf/inqld", area)?;
        field(&body, "inQld")?
            .as_bool()
            .ok_or(ClientError::MissingField("inQld"))
    }

    fn lrf_rating(
        &self,
        area: &ProjectArea,
        method_id: &str,
    ) -> Result<BTreeMap<String, f64>, ClientError> {
        let body = json!({ "projectArea": area, "method": method_id });
        let reply = self.post("lrf/rating", &body)?;
        // non-numeric entries are not ratings
        let ratings = expect_object(reply, "an object of LRF ratings")?
            .into_iter()
            .filter_map(|(key, value)| value.as_f64().map(|v| (key, v)))
            .collect();
        Ok(ratings)
    }

    fn erf_cobenefits(&self, method_id: &str) -> Result<ErfCobenefits, ClientError> {
        let body = self.get("erf/cobenefits", &[("method", method_id)])?;
        Ok(serde_json::from_value(body)?)
    }

    fn ping(&self) -> Result<bool, ClientError> {
        let response = self
            .http
            .get(self.url("lrf/ping"))
            .header("x-api-key", &self.api_key)
            .send()?;
        Ok(response.status().as_u16() == 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_status_field_is_a_failure() {
        assert!(reject_status(&json!({ "status": "error" })).is_err());
        assert!(reject_status(&json!({ "status": "ok", "areas": [] })).is_err());
        assert!(reject_status(&json!({ "status": null })).is_err());
        assert!(reject_status(&json!({ "areas": [] })).is_ok());
    }

    #[test]
    fn missing_numeric_field_is_reported() {
        let body = json!({ "polygonArea": "large" });
        match number(&body, "polygonArea") {
            Err(ClientError::MissingField(name)) => assert_eq!(name, "polygonArea"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn non_object_body_is_an_unexpected_shape() {
        match expect_object(json!([1.0, 2.0]), "an object of LRF ratings") {
            Err(ClientError::UnexpectedShape(expected)) => {
                assert_eq!(expected, "an object of LRF ratings")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let map = expect_object(json!({ "summary": 3.0 }), "an object of LRF ratings").unwrap();
        assert_eq!(map["summary"], json!(3.0));
    }

    #[test]
    fn soil_estimates_decode_provider_names() {
        let raw = json!([{
            "projectType": "pasture",
            "annualSequestrationRate": 10.5,
            "totalSequesteredOverProject": 262.5
        }]);
        let parsed: Vec<SoilProjectEstimate> = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed[0].project_type, "pasture");
        assert_eq!(parsed[0].total, 262.5);
    }

    #[test]
    fn soc_request_uses_provider_names() {
        let request = SocRequest {
            land_area: 12.0,
            carbon_current: 1.2,
            carbon_target: 1.7,
            bulk_density: 1.31,
            depth: 30,
            project_length: 25,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["carbonTarget"], json!(1.7));
        assert_eq!(value["projectLength"], json!(25));
    }
}
