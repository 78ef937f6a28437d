//! Mapbox Directions client
//!
//! HTTP implementation of [`RouteProvider`] for the Mapbox Directions API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::DirectionsConfig;
use crate::error::RouteFetchError;
use crate::geo::GeoPoint;
use crate::providers::RouteProvider;

/// Longest error body kept in a [`RouteFetchError::Http`]
const MAX_ERROR_BODY: usize = 200;

pub struct MapboxDirections {
    http: Client,
    config: DirectionsConfig,
}

impl MapboxDirections {
    pub fn new(config: DirectionsConfig) -> Result<Self, RouteFetchError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, from: GeoPoint, to: GeoPoint) -> String {
        format!(
            "{}/directions/v5/mapbox/{}/{},{};{},{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            from.lon,
            from.lat,
            to.lon,
            to.lat
        )
    }
}

#[async_trait]
impl RouteProvider for MapboxDirections {
    async fn fetch_walking_route(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> Result<Vec<GeoPoint>, RouteFetchError> {
        let url = self.url(from, to);
        tracing::debug!(url = %url, "requesting directions");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("geometries", "geojson"),
                ("overview", "full"),
                ("access_token", self.config.access_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RouteFetchError::Http {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        parse_route(&body)
    }
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    coordinates: Vec<GeoPoint>,
}

/// Coordinates of the first route in a Directions API response body
pub fn parse_route(body: &str) -> Result<Vec<GeoPoint>, RouteFetchError> {
    let response: DirectionsResponse =
        serde_json::from_str(body).map_err(|e| RouteFetchError::Malformed(e.to_string()))?;

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(RouteFetchError::NoRoute)?;

    if route.geometry.coordinates.is_empty() {
        return Err(RouteFetchError::NoRoute);
    }
    Ok(route.geometry.coordinates)
}
