//! Request handlers.
//!
//! Handlers only translate between HTTP and engine calls. Every engine
//! call goes through [`AppState::run`], so it finishes even when the
//! client disconnects.

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::BytesRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use facetdb_core::{
    Attachment, CoreError, Engine, EntitySettings, FacetMap, FieldDef, StatsSnapshot, VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Multipart field carrying an uploaded file.
pub const UPLOAD_FIELD: &str = "picture";

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct Health {
    /// Always `"ok"` when the server answers.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Registered entities.
    pub entities: Vec<String>,
    /// Engine counters.
    pub stats: StatsSnapshot,
}

/// Query of `GET /{entity}/facets`.
#[derive(Debug, Default, Deserialize)]
pub struct FacetQuery {
    /// Restricts the answer to one field.
    pub field: Option<String>,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: VERSION,
        entities: state.engine.registry().names(),
        stats: state.engine.stats(),
    })
}

/// `GET /{entity}/collection`
pub async fn list_documents(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ServerResult<Json<Value>> {
    let page = state.run(move |engine| engine.list(&entity)).await?;
    Ok(Json(page.to_json()))
}

/// `POST /{entity}/collection`
pub async fn create_document(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<Value>> {
    let body = json_object(&state, body)?;
    let doc = state
        .run(move |engine| engine.create(&entity, &body))
        .await?;
    Ok(Json(doc.to_json()))
}

/// `GET /{entity}/collection/{id}`
pub async fn get_document(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    let doc = state
        .run(move |engine| engine.get(&entity, Engine::document_id(&entity, &id)?))
        .await?;
    Ok(Json(doc.to_json()))
}

/// `PUT /{entity}/collection/{id}`
pub async fn replace_document(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<Value>> {
    let body = json_object(&state, body)?;
    let doc = state
        .run(move |engine| engine.replace(&entity, Engine::document_id(&entity, &id)?, &body))
        .await?;
    Ok(Json(doc.to_json()))
}

/// `DELETE /{entity}/collection/{id}`
pub async fn delete_document(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    let deleted = state
        .run(move |engine| {
            let id = Engine::document_id(&entity, &id)?;
            engine.delete(&entity, id)?;
            Ok(id)
        })
        .await?;
    Ok(Json(json!({ "deleted": deleted.to_string() })))
}

/// `GET /{entity}/schema`
pub async fn schema(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ServerResult<Json<Vec<FieldDef>>> {
    Ok(Json(state.run(move |engine| engine.schema(&entity)).await?))
}

/// `GET /{entity}/settings`
pub async fn settings(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ServerResult<Json<EntitySettings>> {
    Ok(Json(state.run(move |engine| engine.settings(&entity)).await?))
}

/// `GET /{entity}/pane.json`
pub async fn pane(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ServerResult<Json<Value>> {
    Ok(Json(state.run(move |engine| engine.pane(&entity)).await?))
}

/// `GET /{entity}/ufacets`
pub async fn unique_facets(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ServerResult<Json<BTreeMap<String, Vec<String>>>> {
    let facets = state
        .run(move |engine| engine.unique_facets(&entity))
        .await?;
    Ok(Json(facets))
}

/// `GET /{entity}/facets?field=`
pub async fn facets(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<FacetQuery>,
) -> ServerResult<Json<FacetMap>> {
    let facets = state
        .run(move |engine| engine.facets(&entity, query.field.as_deref()))
        .await?;
    Ok(Json(facets))
}

/// `GET /{entity}/property/{field}/{value}`
pub async fn find_by_property(
    State(state): State<AppState>,
    Path((entity, field, value)): Path<(String, String, String)>,
) -> ServerResult<Json<Vec<Value>>> {
    let docs = state
        .run(move |engine| engine.find_by_property(&entity, &field, &value))
        .await?;
    Ok(Json(docs.iter().map(|doc| doc.to_json()).collect()))
}

/// `PUT /{entity}/{id}/property/{field}/{value}`
pub async fn patch_property(
    State(state): State<AppState>,
    Path((entity, id, field, value)): Path<(String, String, String, String)>,
) -> ServerResult<Json<Vec<Value>>> {
    let doc = state
        .run(move |engine| {
            let id = Engine::document_id(&entity, &id)?;
            engine.patch_property(&entity, id, &field, &value)
        })
        .await?;
    Ok(Json(vec![doc.to_json()]))
}

/// `DELETE /{entity}/{id}/property/{field}/{value}`
pub async fn delete_property(
    State(state): State<AppState>,
    Path((entity, id, field, value)): Path<(String, String, String, String)>,
) -> ServerResult<Json<Vec<Value>>> {
    let doc = state
        .run(move |engine| {
            let id = Engine::document_id(&entity, &id)?;
            engine.delete_property(&entity, id, &field, &value)
        })
        .await?;
    Ok(Json(vec![doc.to_json()]))
}

/// `POST /{entity}/picture`
///
/// Answers a one-element array, the shape upload widgets expect.
pub async fn upload(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Json<Vec<Attachment>>> {
    let file = read_upload(&state, multipart).await?;
    let attachment = state
        .run(move |engine| {
            engine.upload_attachment(
                &entity,
                file.name.as_deref(),
                file.content_type.as_deref(),
                &file.data,
            )
        })
        .await?;
    Ok(Json(vec![attachment]))
}

/// `POST /{entity}/collection/{id}/picture`
pub async fn attach(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Json<Value>> {
    let file = read_upload(&state, multipart).await?;
    let (attachment, doc) = state
        .run(move |engine| {
            let id = Engine::document_id(&entity, &id)?;
            engine.attach_to_document(
                &entity,
                id,
                file.name.as_deref(),
                file.content_type.as_deref(),
                &file.data,
            )
        })
        .await?;
    Ok(Json(json!({
        "attachment": attachment,
        "document": doc.to_json(),
    })))
}

/// `GET /attachments/{entity}/{file}`
pub async fn download(
    State(state): State<AppState>,
    Path((entity, file)): Path<(String, String)>,
) -> ServerResult<Response> {
    let found = state
        .run(move |engine| {
            let found = engine.attachment(&entity, &file)?;
            found.ok_or_else(|| CoreError::not_found(&entity, &file))
        })
        .await?;
    let (data, content_type) = found;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], data).into_response())
}

struct Upload {
    name: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

/// Pulls the `picture` field out of a multipart body.
async fn read_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Upload> {
    let mut multipart =
        multipart.map_err(|e| ServerError::invalid(format!("multipart body expected: {e}")))?;
    let limit = state.config.max_body_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        return Ok(Upload {
            name,
            content_type,
            data,
        });
    }
    Err(ServerError::invalid(format!(
        "multipart field {UPLOAD_FIELD:?} is missing"
    )))
}

fn multipart_error(e: MultipartError, limit: usize) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge { limit }
    } else {
        ServerError::invalid(e.body_text())
    }
}

/// Parses a request body as a JSON object.
fn json_object(
    state: &AppState,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Map<String, Value>> {
    let body = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge {
                limit: state.config.max_body_bytes,
            }
        } else {
            ServerError::invalid(e.body_text())
        }
    })?;
    match serde_json::from_slice(&body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ServerError::invalid("body must be a JSON object")),
        Err(e) => Err(ServerError::invalid(format!("malformed JSON: {e}"))),
    }
}
