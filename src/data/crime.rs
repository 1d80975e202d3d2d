use super::outcomes::{outcome_key, UNKNOWN_OUTCOME};
use crate::core::geo::LatLng;
use serde::{Deserialize, Serialize};

/// A street-level crime record as returned by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crime {
    pub category: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub persistent_id: Option<String>,
    #[serde(default)]
    pub location_type: Option<String>,
    pub location: CrimeLocation,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub outcome_status: Option<OutcomeStatus>,
    pub month: String,
}

/// Location of a crime; coordinates arrive as decimal strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeLocation {
    pub latitude: String,
    pub longitude: String,
    #[serde(default)]
    pub street: Option<Street>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Street {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStatus {
    pub category: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl Crime {
    /// Parses the string coordinates, `None` if either is malformed
    pub fn lat_lng(&self) -> Option<LatLng> {
        let lat = self.location.latitude.trim().parse::<f64>().ok()?;
        let lng = self.location.longitude.trim().parse::<f64>().ok()?;
        let point = LatLng::new(lat, lng);
        point.is_valid().then_some(point)
    }

    /// Converts into a renderable feature, dropping records without usable coordinates
    pub fn to_feature(&self) -> Option<CrimeFeature> {
        let Some(location) = self.lat_lng() else {
            log::debug!(
                "dropping crime {:?} with unusable location ({}, {})",
                self.id,
                self.location.latitude,
                self.location.longitude
            );
            return None;
        };

        let outcome = self
            .outcome_status
            .as_ref()
            .map(|status| status.category.clone())
            .filter(|category| !category.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        Some(CrimeFeature {
            category: self.category.clone(),
            outcome_key: outcome_key(&outcome).to_string(),
            outcome,
            month: self.month.clone(),
            location,
            street_name: self.location.street.as_ref().map(|s| s.name.clone()),
            context: self.context.clone().filter(|c| !c.trim().is_empty()),
        })
    }
}

/// One point handed to the map layer; also the payload unit of a cached tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeFeature {
    pub category: String,
    /// Raw outcome description, `"Unknown"` when the source has none
    pub outcome: String,
    /// Stable outcome identifier, see [`super::outcomes`]
    pub outcome_key: String,
    pub month: String,
    pub location: LatLng,
    pub street_name: Option<String>,
    pub context: Option<String>,
}

impl CrimeFeature {
    pub fn has_known_outcome(&self) -> bool {
        self.outcome_key != UNKNOWN_OUTCOME
    }
}

/// Converts a batch of wire records into features
pub fn to_features(crimes: &[Crime]) -> Vec<CrimeFeature> {
    crimes.iter().filter_map(Crime::to_feature).collect()
}
