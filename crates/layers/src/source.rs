//! Overlay service client.
//!
//! Regional overlays are a `GET` over the viewport; container overlays are a
//! `POST` carrying the parcel's container bounds and survey filter.

use foundation::{ViewBounds, Wsen};
use serde::Serialize;
use streaming::BoxFuture;
use thiserror::Error;
use tracing::debug;

use crate::feature::{FeatureCollection, OverlayResponse};
use crate::overlay::{OverlayLayerKind, OverlayMode, SurveyFilter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("overlay service answered HTTP {status}")]
    Http { status: u16 },
    #[error("could not decode overlay response: {0}")]
    Decode(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("no response within {ms} ms")]
    Timeout { ms: u64 },
    #[error("no bounds to query overlays for")]
    MissingBounds,
}

impl From<reqwest::Error> for OverlayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OverlayError::Timeout { ms: 0 }
        } else if e.is_decode() {
            OverlayError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            OverlayError::Http {
                status: status.as_u16(),
            }
        } else {
            OverlayError::Transport(e.to_string())
        }
    }
}

/// One layer's worth of overlay data to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRequest {
    pub layer: OverlayLayerKind,
    pub mode: OverlayMode,
    /// US state the survey data belongs to.
    pub state: String,
    /// Viewport in regional mode, container bounds in container mode.
    pub bounds: ViewBounds,
    pub filter: SurveyFilter,
}

impl OverlayRequest {
    pub fn path(&self) -> String {
        format!(
            "/overlays/{}/{}/{}",
            self.mode.as_str(),
            self.layer.path_segment(),
            self.state
        )
    }
}

pub trait OverlayFetcher: Send + Sync {
    fn fetch_overlay<'a>(
        &'a self,
        request: &'a OverlayRequest,
    ) -> BoxFuture<'a, Result<FeatureCollection, OverlayError>>;
}

#[derive(Serialize)]
struct SchemaData<'a> {
    plss: &'a SurveyFilter,
}

#[derive(Serialize)]
struct ContainerBody<'a> {
    container_bounds: Wsen,
    schema_data: SchemaData<'a>,
}

#[derive(Debug, Clone)]
pub struct HttpOverlayService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOverlayService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl OverlayFetcher for HttpOverlayService {
    fn fetch_overlay<'a>(
        &'a self,
        request: &'a OverlayRequest,
    ) -> BoxFuture<'a, Result<FeatureCollection, OverlayError>> {
        let url = format!("{}{}", self.base_url, request.path());
        Box::pin(async move {
            let b = &request.bounds;
            let builder = match request.mode {
                OverlayMode::Regional => self.client.get(&url).query(&[
                    ("min_lon", b.min_lon),
                    ("min_lat", b.min_lat),
                    ("max_lon", b.max_lon),
                    ("max_lat", b.max_lat),
                ]),
                OverlayMode::Container => self.client.post(&url).json(&ContainerBody {
                    container_bounds: b.to_wsen(),
                    schema_data: SchemaData {
                        plss: &request.filter,
                    },
                }),
            };

            let resp = builder.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(OverlayError::Http {
                    status: status.as_u16(),
                });
            }
            let body = resp.bytes().await?;
            let parsed: OverlayResponse =
                serde_json::from_slice(&body).map_err(|e| OverlayError::Decode(e.to_string()))?;
            if !parsed.success {
                let reason = parsed
                    .error
                    .unwrap_or_else(|| "service reported failure".to_string());
                return Err(OverlayError::Decode(reason));
            }
            debug!(
                layer = %request.layer,
                mode = request.mode.as_str(),
                features = parsed.features.len(),
                "overlay fetched"
            );
            Ok(parsed.into_collection())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::Json;
    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use foundation::ViewBounds;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::{HttpOverlayService, OverlayError, OverlayFetcher, OverlayRequest};
    use crate::overlay::{OverlayLayerKind, OverlayMode, RangeDirection, SurveyFilter};

    async fn regional(
        Path((layer, state)): Path<(String, String)>,
        Query(q): Query<HashMap<String, f64>>,
    ) -> Response {
        if state == "Nowhere" {
            return StatusCode::NOT_FOUND.into_response();
        }
        if layer == "ranges" {
            return Json(json!({"success": false, "error": "no data"})).into_response();
        }
        Json(json!({
            "success": true,
            "layer": layer,
            "mode": "regional",
            "state": state,
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [q["min_lon"], q["max_lat"]]},
                "properties": {}
            }]
        }))
        .into_response()
    }

    async fn container(
        Path((layer, _state)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        Json(json!({
            "layer": layer,
            "features": [{
                "geometry": null,
                "properties": {
                    "west": body["container_bounds"]["west"],
                    "plss": body["schema_data"]["plss"]
                }
            }]
        }))
    }

    async fn serve() -> HttpOverlayService {
        let app = Router::new()
            .route("/overlays/regional/:layer/:state", get(regional))
            .route("/overlays/container/:layer/:state", post(container));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        HttpOverlayService::new(format!("http://{addr}"))
    }

    fn request(layer: OverlayLayerKind, mode: OverlayMode, state: &str) -> OverlayRequest {
        OverlayRequest {
            layer,
            mode,
            state: state.to_string(),
            bounds: ViewBounds::new(41.0, 42.0, -106.0, -105.0),
            filter: SurveyFilter {
                range_number: Some(68),
                range_direction: Some(RangeDirection::W),
                ..SurveyFilter::default()
            },
        }
    }

    #[test]
    fn paths_use_service_layer_names() {
        let r = request(OverlayLayerKind::QuarterSections, OverlayMode::Container, "Wyoming");
        assert_eq!(r.path(), "/overlays/container/quarter_sections/Wyoming");
    }

    #[tokio::test]
    async fn regional_sends_viewport_as_query() {
        let svc = serve().await;
        let fc = svc
            .fetch_overlay(&request(OverlayLayerKind::Township, OverlayMode::Regional, "Wyoming"))
            .await
            .unwrap();
        assert_eq!(fc.len(), 1);
        let b = fc.bounds().unwrap();
        assert_eq!((b.min_lon, b.max_lat), (-106.0, 42.0));
    }

    #[tokio::test]
    async fn container_posts_bounds_and_filter() {
        let svc = serve().await;
        let fc = svc
            .fetch_overlay(&request(OverlayLayerKind::Sections, OverlayMode::Container, "Wyoming"))
            .await
            .unwrap();
        let props = &fc.features[0].properties;
        assert_eq!(props["west"], json!(-106.0));
        assert_eq!(props["plss"], json!({"range_number": 68, "range_direction": "W"}));
    }

    #[tokio::test]
    async fn failures_are_typed() {
        let svc = serve().await;
        let err = svc
            .fetch_overlay(&request(OverlayLayerKind::Grid, OverlayMode::Regional, "Nowhere"))
            .await
            .unwrap_err();
        assert_eq!(err, OverlayError::Http { status: 404 });

        let err = svc
            .fetch_overlay(&request(OverlayLayerKind::Range, OverlayMode::Regional, "Wyoming"))
            .await
            .unwrap_err();
        assert_eq!(err, OverlayError::Decode("no data".to_string()));
    }
}
