//! Place names to coordinates and back, via OpenStreetMap Nominatim.
//!
//! A small table of frequently requested places answers instantly; anything
//! else goes to the network.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{Location, config::GeocodingConfig, error::PlannerError};

const REQUEST_TIMEOUT_SECS: u64 = 10;

const COMMON_LOCATIONS: &[(&str, f64, f64, &str)] = &[
    ("delaware", 39.0, -75.5, "Delaware, USA"),
    ("boston", 42.3601, -71.0589, "Boston, MA, USA"),
    ("new york", 40.7128, -74.006, "New York, NY, USA"),
    ("california", 36.7783, -119.4179, "California, USA"),
    ("texas", 31.9686, -99.9018, "Texas, USA"),
    ("florida", 27.9944, -81.7603, "Florida, USA"),
    ("arizona", 34.0489, -111.0937, "Arizona, USA"),
    ("colorado", 39.5501, -105.7821, "Colorado, USA"),
    ("denver", 39.7392, -104.9903, "Denver, CO, USA"),
    ("london", 51.5074, -0.1278, "London, UK"),
    ("paris", 48.8566, 2.3522, "Paris, France"),
    ("tokyo", 35.6762, 139.6503, "Tokyo, Japan"),
    ("dubai", 25.2048, 55.2708, "Dubai, UAE"),
    ("sydney", -33.8688, 151.2093, "Sydney, Australia"),
    ("mumbai", 19.076, 72.8777, "Mumbai, India"),
    ("sao paulo", -23.5505, -46.6333, "São Paulo, Brazil"),
    ("nairobi", -1.2921, 36.8219, "Nairobi, Kenya"),
    ("moscow", 55.7558, 37.6173, "Moscow, Russia"),
    ("beijing", 39.9042, 116.4074, "Beijing, China"),
];

#[derive(Debug, Clone)]
pub struct Geocoder {
    base_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    address: Option<ReverseAddress>,
    display_name: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl Geocoder {
    pub fn from_config(config: &GeocodingConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build geocoding HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Resolve a place name; `Ok(None)` when nothing matches.
    pub async fn lookup(&self, place: &str) -> Result<Option<Location>> {
        if let Some(hit) = cached_location(place) {
            tracing::debug!(place, "found location in built-in table");
            return Ok(Some(hit));
        }

        tracing::info!(place, "geocoding via Nominatim");

        let url = format!("{}/search", self.base_url);
        let res = self
            .http
            .get(&url)
            .query(&[
                ("q", place.trim()),
                ("format", "json"),
                ("limit", "1"),
                ("addressdetails", "1"),
            ])
            .send()
            .await
            .context("Failed to send request to Nominatim (search)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read Nominatim search response body")?;

        if !status.is_success() {
            return Err(PlannerError::upstream("Nominatim", status, &body).into());
        }

        let hits: Vec<SearchHit> =
            serde_json::from_str(&body).context("Failed to parse Nominatim search JSON")?;

        let Some(first) = hits.into_iter().next() else {
            tracing::warn!(place, "no geocoding results");
            return Ok(None);
        };

        let lat: f64 = first
            .lat
            .parse()
            .with_context(|| format!("Nominatim returned a non-numeric latitude: {}", first.lat))?;
        let lon: f64 = first
            .lon
            .parse()
            .with_context(|| format!("Nominatim returned a non-numeric longitude: {}", first.lon))?;

        Location::new(lat, lon, Some(first.display_name)).map(Some)
    }

    /// Like [`Geocoder::lookup`], but a miss is an error.
    pub async fn require(&self, place: &str) -> Result<Location> {
        self.lookup(place)
            .await?
            .ok_or_else(|| PlannerError::LocationNotFound(place.to_string()).into())
    }

    /// Best-effort place name for coordinates. Failures are logged and yield `None`.
    pub async fn reverse(&self, lat: f64, lon: f64) -> Option<String> {
        let url = format!("{}/reverse", self.base_url);
        let lat_s = lat.to_string();
        let lon_s = lon.to_string();

        let response = match self
            .http
            .get(&url)
            .query(&[
                ("lat", lat_s.as_str()),
                ("lon", lon_s.as_str()),
                ("format", "json"),
                ("zoom", "10"),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Reverse geocode request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!("Reverse geocode returned status {}", response.status());
            return None;
        }

        let body: ReverseResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Reverse geocode parse error: {}", e);
                return None;
            }
        };

        if body.error.is_some() {
            tracing::warn!(lat, lon, "no location found for coordinates");
            return None;
        }

        let from_address = body.address.and_then(|a| {
            a.city
                .or(a.town)
                .or(a.village)
                .or(a.county)
                .or(a.state)
                .or(a.country)
        });

        let name = from_address.or_else(|| {
            body.display_name
                .as_deref()
                .and_then(|d| d.split(',').next())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        });

        if let Some(name) = &name {
            tracing::info!(lat, lon, "reverse geocoded to {}", name);
        }
        name
    }
}

fn cached_location(place: &str) -> Option<Location> {
    let normalized = place.trim().to_lowercase();
    COMMON_LOCATIONS
        .iter()
        .find(|(key, ..)| *key == normalized)
        .map(|(_, lat, lon, name)| Location {
            lat: *lat,
            lon: *lon,
            name: Some((*name).to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn geocoder(base_url: &str) -> Geocoder {
        Geocoder::from_config(&GeocodingConfig {
            base_url: base_url.to_string(),
            user_agent: "WeatherWise-Test/1.0".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn common_places_skip_the_network() {
        // No mock mounted: any request would fail.
        let mock_server = MockServer::start().await;
        let hit = geocoder(&mock_server.uri()).lookup("  New York ").await.unwrap().unwrap();

        assert_eq!(hit.name.as_deref(), Some("New York, NY, USA"));
        assert!((hit.lat - 40.7128).abs() < 1e-9);
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_parses_first_search_hit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Reykjavik"))
            .and(query_param("limit", "1"))
            .and(header("User-Agent", "WeatherWise-Test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"lat": "64.1466", "lon": "-21.9426", "display_name": "Reykjavík, Iceland"}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let hit = geocoder(&mock_server.uri()).lookup("Reykjavik").await.unwrap().unwrap();
        assert_eq!(hit.name.as_deref(), Some("Reykjavík, Iceland"));
        assert!((hit.lon + 21.9426).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_search_is_none_and_require_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let geo = geocoder(&mock_server.uri());
        assert!(geo.lookup("Nowhere Atoll").await.unwrap().is_none());

        let err = geo.require("Nowhere Atoll").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PlannerError>(),
            Some(PlannerError::LocationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn reverse_prefers_city_then_falls_back() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", "39.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "display_name": "Denver, Colorado, USA",
                "address": {"city": "Denver", "state": "Colorado", "country": "USA"}
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "display_name": "Somewhere Sea, Ocean"
            })))
            .mount(&mock_server)
            .await;

        let geo = geocoder(&mock_server.uri());
        assert_eq!(geo.reverse(39.7, -104.9).await.as_deref(), Some("Denver"));
        assert_eq!(geo.reverse(10.0, 10.0).await.as_deref(), Some("Somewhere Sea"));
    }

    #[tokio::test]
    async fn reverse_swallows_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "Unable to geocode"})),
            )
            .mount(&mock_server)
            .await;

        assert_eq!(geocoder(&mock_server.uri()).reverse(0.0, 0.0).await, None);
    }
}
