//! OSRM HTTP adapter for distance matrices and routed legs.

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::geo::HaversineMatrix;
use crate::model::Coordinate;
use crate::polyline::Polyline;
use crate::traits::{DistanceMatrixProvider, MatrixEstimate, RouteLeg, RoutingProvider};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "foot".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, RoutingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, service: &str, locations: &[Coordinate], query: &str) -> String {
        let coords = locations
            .iter()
            .map(|c| format!("{:.6},{:.6}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/{}/v1/{}/{}?{}",
            self.config.base_url, service, self.config.profile, coords, query
        )
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<T, RoutingError> {
        Ok(self.client.get(url).send()?.error_for_status()?.json::<T>()?)
    }
}

fn seconds_to_minutes(seconds: f64) -> u32 {
    (seconds / 60.0).round() as u32
}

impl DistanceMatrixProvider for OsrmClient {
    fn matrix_for(&self, locations: &[Coordinate]) -> Result<MatrixEstimate, RoutingError> {
        if locations.is_empty() {
            return Ok(MatrixEstimate::default());
        }

        let body: OsrmTableResponse = self.get(self.url("table", locations, "annotations=duration,distance"))?;
        if body.code != "Ok" {
            return Err(RoutingError::Status(body.code));
        }

        let (Some(durations), Some(distances)) = (body.durations, body.distances) else {
            return Err(RoutingError::Malformed("table response without annotations".to_string()));
        };

        // OSRM reports unreachable pairs as null; estimate those cells.
        let fallback = HaversineMatrix::default();
        let mut estimate = MatrixEstimate {
            distances: Vec::with_capacity(locations.len()),
            durations: Vec::with_capacity(locations.len()),
        };
        for (i, (duration_row, distance_row)) in durations.iter().zip(&distances).enumerate() {
            let mut minutes = Vec::with_capacity(duration_row.len());
            let mut meters = Vec::with_capacity(distance_row.len());
            for (j, (duration, distance)) in duration_row.iter().zip(distance_row).enumerate() {
                match (duration, distance, locations.get(i), locations.get(j)) {
                    (Some(seconds), Some(m), _, _) => {
                        minutes.push(seconds_to_minutes(*seconds));
                        meters.push(*m);
                    }
                    (_, _, Some(from), Some(to)) => {
                        let m = fallback.distance_meters(*from, *to);
                        minutes.push(fallback.meters_to_minutes(m));
                        meters.push(m);
                    }
                    _ => return Err(RoutingError::Malformed("table larger than request".to_string())),
                }
            }
            estimate.durations.push(minutes);
            estimate.distances.push(meters);
        }

        Ok(estimate)
    }
}

impl RoutingProvider for OsrmClient {
    fn route(&self, from: Coordinate, to: Coordinate) -> Result<RouteLeg, RoutingError> {
        let body: OsrmRouteResponse = self.get(self.url("route", &[from, to], "overview=full&geometries=geojson"))?;
        if body.code != "Ok" {
            return Err(RoutingError::Status(body.code));
        }

        let route = body
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| RoutingError::Malformed("route response without routes".to_string()))?;

        Ok(RouteLeg {
            distance_meters: route.distance,
            duration_minutes: seconds_to_minutes(route.duration),
            polyline: route.geometry.map(|g| Polyline::from_lng_lat(&g.coordinates)),
            transit: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: Option<OsrmGeometry>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}
