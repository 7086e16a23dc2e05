//! # NOAA CO-OPS Fetch Collaborators
//!
//! The two network boundaries the core consumes, behind traits so the
//! directory service and tests never touch HTTP:
//!
//! - [`CatalogFetcher`]: the full tide-prediction station catalog, from the
//!   CO-OPS metadata API (`mdapi/prod/webapi/stations.json`).
//! - [`PredictionFetcher`]: high/low ("hilo") predicted extrema for one
//!   station, from the CO-OPS data API (`api/prod/datagetter`).
//!
//! ## Wire Handling
//!
//! Parsing is split from transport: `parse_station_catalog` and
//! `parse_hilo_predictions` are pure functions over the response body, so
//! the quirks of the feed (stringly-typed heights, `"H"`/`"L"` type codes,
//! naive GMT timestamps, error objects delivered with HTTP 200) are covered
//! by unit tests without a server.
//!
//! Rows that fail to parse are skipped rather than failing the fetch; the
//! derivation engine only requires well-typed points, and one malformed row
//! should not take down the whole station. A response with *no* usable rows
//! is [`TideError::DataUnavailable`].
//!
//! Predictions are requested in GMT and a fixed `MLLW` datum so every
//! timestamp in the system is UTC and every height shares a reference.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::{ExtremaPoint, Station, TideError, TideKind};

const MDAPI_STATIONS_URL: &str =
    "https://api.tidesandcurrents.noaa.gov/mdapi/prod/webapi/stations.json";
const DATAGETTER_URL: &str = "https://api.tidesandcurrents.noaa.gov/api/prod/datagetter";

/// Timestamp format of the datagetter feed (GMT, no zone suffix).
const PREDICTION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// How far back and forward to request hilo predictions, sized to cover the
/// chart window with margin on both sides.
const FETCH_BACK_DAYS: i64 = 1;
const FETCH_FORWARD_DAYS: i64 = 2;

/// Network boundary for the station catalog.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Fetch the complete station catalog from the upstream source.
    async fn fetch_station_catalog(&self) -> Result<Vec<Station>, TideError>;
}

/// Network boundary for per-station hilo predictions.
#[async_trait]
pub trait PredictionFetcher: Send + Sync {
    /// Fetch predicted extrema around the current time for one station.
    async fn fetch_predictions(&self, station_id: &str) -> Result<Vec<ExtremaPoint>, TideError>;
}

/// Concrete CO-OPS client over reqwest. Cloning shares the underlying
/// connection pool, so one client can serve both fetch traits.
#[derive(Clone)]
pub struct NoaaClient {
    http: reqwest::Client,
    stations_url: String,
    datagetter_url: String,
}

impl NoaaClient {
    /// Build a client with a 30-second request timeout.
    pub fn new() -> Result<Self, TideError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(NoaaClient {
            http,
            stations_url: MDAPI_STATIONS_URL.to_string(),
            datagetter_url: DATAGETTER_URL.to_string(),
        })
    }

    /// Point the client at alternate endpoints (for a mock server).
    pub fn with_endpoints(mut self, stations_url: String, datagetter_url: String) -> Self {
        self.stations_url = stations_url;
        self.datagetter_url = datagetter_url;
        self
    }
}

#[async_trait]
impl CatalogFetcher for NoaaClient {
    async fn fetch_station_catalog(&self) -> Result<Vec<Station>, TideError> {
        tracing::info!("fetching station catalog");
        let body = self
            .http
            .get(&self.stations_url)
            .query(&[("type", "tidepredictions"), ("units", "english")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let stations = parse_station_catalog(&body)?;
        tracing::info!(count = stations.len(), "station catalog fetched");
        Ok(stations)
    }
}

#[async_trait]
impl PredictionFetcher for NoaaClient {
    async fn fetch_predictions(&self, station_id: &str) -> Result<Vec<ExtremaPoint>, TideError> {
        let now = Utc::now();
        let begin = (now - Duration::days(FETCH_BACK_DAYS)).format("%Y%m%d").to_string();
        let end = (now + Duration::days(FETCH_FORWARD_DAYS)).format("%Y%m%d").to_string();

        tracing::info!(station_id, %begin, %end, "fetching hilo predictions");
        let body = self
            .http
            .get(&self.datagetter_url)
            .query(&[
                ("product", "predictions"),
                ("application", "tide-watch"),
                ("interval", "hilo"),
                ("datum", "MLLW"),
                ("units", "english"),
                ("time_zone", "gmt"),
                ("format", "json"),
                ("station", station_id),
                ("begin_date", begin.as_str()),
                ("end_date", end.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_hilo_predictions(&body)
    }
}

// -- Wire format --

#[derive(Deserialize)]
struct StationsResponse {
    #[serde(default)]
    stations: Vec<WireStation>,
}

#[derive(Deserialize)]
struct WireStation {
    id: String,
    name: String,
    #[serde(default)]
    state: Option<String>,
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct PredictionsResponse {
    #[serde(default)]
    predictions: Vec<WirePrediction>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct WirePrediction {
    /// Naive GMT timestamp, e.g. "2025-08-31 03:12".
    t: String,
    /// Height as a decimal string, e.g. "9.717".
    v: String,
    /// "H" or "L".
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct WireError {
    message: String,
}

/// Decode the metadata API station list into catalog entries.
///
/// Entries with non-finite or out-of-range coordinates are dropped; an empty
/// `state` becomes `region: None`.
pub fn parse_station_catalog(body: &str) -> Result<Vec<Station>, TideError> {
    let response: StationsResponse = serde_json::from_str(body)
        .map_err(|e| TideError::DataUnavailable(format!("station catalog decode: {e}")))?;

    let stations: Vec<Station> = response
        .stations
        .into_iter()
        .filter(|w| {
            let valid = w.lat.is_finite()
                && w.lng.is_finite()
                && (-90.0..=90.0).contains(&w.lat)
                && (-180.0..=180.0).contains(&w.lng)
                && !w.id.is_empty();
            if !valid {
                tracing::debug!(id = %w.id, "skipping station with invalid coordinates");
            }
            valid
        })
        .map(|w| Station {
            id: w.id,
            name: w.name,
            region: w.state.filter(|s| !s.trim().is_empty()),
            latitude: w.lat,
            longitude: w.lng,
        })
        .collect();

    if stations.is_empty() {
        return Err(TideError::DataUnavailable(
            "station catalog contained no usable entries".to_string(),
        ));
    }
    Ok(stations)
}

/// Decode a hilo prediction response into extrema points.
///
/// Malformed rows (bad timestamp, non-numeric height, unknown type code)
/// are skipped; only a response with no usable rows at all is an error.
pub fn parse_hilo_predictions(body: &str) -> Result<Vec<ExtremaPoint>, TideError> {
    let response: PredictionsResponse = serde_json::from_str(body)
        .map_err(|e| TideError::DataUnavailable(format!("prediction decode: {e}")))?;

    if let Some(error) = response.error {
        return Err(TideError::DataUnavailable(error.message));
    }

    let points: Vec<ExtremaPoint> = response
        .predictions
        .iter()
        .filter_map(parse_prediction_row)
        .collect();

    if points.is_empty() {
        return Err(TideError::DataUnavailable(
            "prediction response contained no usable rows".to_string(),
        ));
    }
    Ok(points)
}

fn parse_prediction_row(row: &WirePrediction) -> Option<ExtremaPoint> {
    let timestamp: DateTime<Utc> = NaiveDateTime::parse_from_str(&row.t, PREDICTION_TIME_FORMAT)
        .ok()?
        .and_utc();
    let height: f32 = row.v.trim().parse().ok()?;
    let kind = match row.kind.trim() {
        "H" => TideKind::High,
        "L" => TideKind::Low,
        _ => return None,
    };
    Some(ExtremaPoint {
        timestamp,
        height,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_hilo_predictions() {
        let body = r#"{"predictions":[
            {"t":"2025-08-31 03:12","v":"9.717","type":"H"},
            {"t":"2025-08-31 09:26","v":"-0.221","type":"L"}
        ]}"#;

        let points = parse_hilo_predictions(body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(
            points[0].timestamp,
            Utc.with_ymd_and_hms(2025, 8, 31, 3, 12, 0).unwrap()
        );
        assert_eq!(points[0].kind, TideKind::High);
        assert_eq!(points[1].height, -0.221);
        assert_eq!(points[1].kind, TideKind::Low);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let body = r#"{"predictions":[
            {"t":"not a time","v":"9.7","type":"H"},
            {"t":"2025-08-31 09:26","v":"n/a","type":"L"},
            {"t":"2025-08-31 15:40","v":"8.9","type":"X"},
            {"t":"2025-08-31 21:55","v":"0.3","type":"L"}
        ]}"#;

        let points = parse_hilo_predictions(body).unwrap();
        assert_eq!(points.len(), 1, "only the fully valid row survives");
        assert_eq!(points[0].height, 0.3);
    }

    #[test]
    fn all_rows_bad_is_data_unavailable() {
        let body = r#"{"predictions":[{"t":"???","v":"?","type":"?"}]}"#;
        assert!(matches!(
            parse_hilo_predictions(body),
            Err(TideError::DataUnavailable(_))
        ));
    }

    #[test]
    fn upstream_error_object_is_data_unavailable() {
        // The datagetter reports bad station ids as a 200 with an error body.
        let body = r#"{"error":{"message":"No Predictions data was found."}}"#;
        match parse_hilo_predictions(body) {
            Err(TideError::DataUnavailable(msg)) => {
                assert!(msg.contains("No Predictions"));
            }
            other => panic!("expected DataUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn parses_station_catalog() {
        let body = r#"{"count":2,"stations":[
            {"id":"8418150","name":"Portland","state":"ME","lat":43.6567,"lng":-70.2467},
            {"id":"9414290","name":"San Francisco","state":"","lat":37.8063,"lng":-122.4659}
        ]}"#;

        let stations = parse_station_catalog(body).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].region.as_deref(), Some("ME"));
        assert_eq!(stations[1].region, None, "empty state becomes None");
        assert_eq!(stations[1].latitude, 37.8063);
    }

    #[test]
    fn stations_with_bad_coordinates_are_dropped() {
        let body = r#"{"stations":[
            {"id":"0000001","name":"Nowhere","state":"","lat":999.0,"lng":0.0},
            {"id":"8418150","name":"Portland","state":"ME","lat":43.6567,"lng":-70.2467}
        ]}"#;

        let stations = parse_station_catalog(body).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, "8418150");
    }

    #[test]
    fn empty_catalog_is_data_unavailable() {
        assert!(matches!(
            parse_station_catalog(r#"{"stations":[]}"#),
            Err(TideError::DataUnavailable(_))
        ));
    }

    mod transport {
        use super::super::*;
        use httpmock::prelude::*;

        fn client_for(server: &MockServer) -> NoaaClient {
            NoaaClient::new()
                .unwrap()
                .with_endpoints(server.url("/stations.json"), server.url("/datagetter"))
        }

        #[tokio::test]
        async fn fetches_and_parses_the_station_catalog() {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/stations.json")
                        .query_param("type", "tidepredictions");
                    then.status(200)
                        .header("content-type", "application/json")
                        .body(
                            r#"{"count":1,"stations":[
                                {"id":"8418150","name":"Portland","state":"ME","lat":43.6567,"lng":-70.2467}
                            ]}"#,
                        );
                })
                .await;

            let stations = client_for(&server).fetch_station_catalog().await.unwrap();
            mock.assert_async().await;
            assert_eq!(stations.len(), 1);
            assert_eq!(stations[0].id, "8418150");
            assert_eq!(stations[0].region.as_deref(), Some("ME"));
        }

        #[tokio::test]
        async fn requests_hilo_predictions_in_gmt() {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/datagetter")
                        .query_param("product", "predictions")
                        .query_param("interval", "hilo")
                        .query_param("time_zone", "gmt")
                        .query_param("datum", "MLLW")
                        .query_param("station", "8418150");
                    then.status(200)
                        .header("content-type", "application/json")
                        .body(
                            r#"{"predictions":[
                                {"t":"2025-08-31 03:12","v":"9.717","type":"H"},
                                {"t":"2025-08-31 09:26","v":"-0.221","type":"L"}
                            ]}"#,
                        );
                })
                .await;

            let points = client_for(&server)
                .fetch_predictions("8418150")
                .await
                .unwrap();
            mock.assert_async().await;
            assert_eq!(points.len(), 2);
            assert_eq!(points[0].kind, TideKind::High);
        }

        #[tokio::test]
        async fn upstream_5xx_is_a_network_error() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/stations.json");
                    then.status(503);
                })
                .await;

            let result = client_for(&server).fetch_station_catalog().await;
            assert!(matches!(result, Err(TideError::Network(_))));
        }
    }
}
