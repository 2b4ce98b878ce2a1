//! Discovery and driver endpoints

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::{base_url, AppState};
use crate::error::ProvisionError;
use crate::version::ApiVersion;

fn version_document(base: &str) -> Value {
    json!({
        "id": "v1",
        "links": [{"href": format!("{}/v1/", base), "rel": "self"}],
        "status": "CURRENT",
        "min_version": ApiVersion::MIN.to_string(),
        "version": ApiVersion::MAX.to_string(),
    })
}

/// GET / - list the API versions served
pub async fn root(headers: HeaderMap) -> Json<Value> {
    let base = base_url(&headers);
    let v1 = version_document(&base);
    Json(json!({
        "name": "OpenStack Ironic API",
        "description": "Ironic is an OpenStack project which aims to provision baremetal machines.",
        "versions": [v1.clone()],
        "default_version": v1,
    }))
}

/// GET /v1 - the v1 document with links to every collection
pub async fn v1(headers: HeaderMap) -> Json<Value> {
    let base = base_url(&headers);
    let collection = |name: &str| {
        json!([
            {"href": format!("{}/v1/{}/", base, name), "rel": "self"},
            {"href": format!("{}/{}/", base, name), "rel": "bookmark"},
        ])
    };
    Json(json!({
        "id": "v1",
        "links": [{"href": format!("{}/v1/", base), "rel": "self"}],
        "media_types": [{
            "base": "application/json",
            "type": "application/vnd.openstack.ironic.v1+json",
        }],
        "chassis": collection("chassis"),
        "nodes": collection("nodes"),
        "ports": collection("ports"),
        "drivers": collection("drivers"),
    }))
}

fn driver_document(state: &AppState, name: &str, base: &str) -> Value {
    json!({
        "name": name,
        "hosts": [state.conductor.host()],
        "nodes": state.conductor.nodes_using(name),
        "links": super::views::links(base, &format!("drivers/{}", name)),
    })
}

/// GET /v1/drivers
pub async fn list_drivers(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let base = base_url(&headers);
    let drivers: Vec<Value> = state
        .conductor
        .drivers()
        .names()
        .iter()
        .map(|name| driver_document(&state, name, &base))
        .collect();
    Json(json!({ "drivers": drivers }))
}

/// GET /v1/drivers/:name
pub async fn get_driver(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    if !state.conductor.drivers().contains(&name) {
        return Err(ApiError::with_status(
            StatusCode::NOT_FOUND,
            ProvisionError::DriverNotFound(name),
        ));
    }
    Ok(Json(driver_document(&state, &name, &base_url(&headers))))
}
