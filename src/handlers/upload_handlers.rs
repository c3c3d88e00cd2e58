//! HTTP handlers for the upload lifecycle.
//! Bodies are typed; every decision is delegated to `UploadService`.

use crate::{
    errors::AppError,
    handlers::{
        extract::{AppJson, AppPath, AppQuery},
        principal::{Authenticated, Viewer},
    },
    models::{
        part::{CompletedPart, PartRecord},
        upload::UploadView,
    },
    services::upload_service::{
        InitiateUpload, InitiatedUpload, ListFilter, PartUrl, UpdateUpload, UploadList,
        UploadService,
    },
};
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /uploads/{id}/part-urls`.
#[derive(Debug, Deserialize)]
pub struct PartUrlsReq {
    pub part_numbers: Vec<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartUrlsResp {
    pub part_urls: Vec<PartUrl>,
}

/// Body of `PUT /uploads/{id}/parts/{part_number}`.
#[derive(Debug, Deserialize)]
pub struct ReportPartReq {
    pub etag: String,
}

/// Body of `POST /uploads/{id}/complete`.
#[derive(Debug, Deserialize)]
pub struct CompleteReq {
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartsResp {
    pub parts: Vec<PartRecord>,
}

/// `POST /uploads` — open a multipart session.
pub async fn initiate_upload(
    State(service): State<UploadService>,
    Authenticated(principal): Authenticated,
    AppJson(body): AppJson<InitiateUpload>,
) -> Result<(StatusCode, Json<InitiatedUpload>), AppError> {
    let initiated = service.initiate(principal, body).await?;
    Ok((StatusCode::CREATED, Json(initiated)))
}

/// `POST /uploads/{id}/part-urls` — presign part URLs.
pub async fn request_part_urls(
    State(service): State<UploadService>,
    Authenticated(principal): Authenticated,
    AppPath(upload_id): AppPath<Uuid>,
    AppJson(body): AppJson<PartUrlsReq>,
) -> Result<Json<PartUrlsResp>, AppError> {
    let part_urls = service
        .request_part_urls(principal, upload_id, &body.part_numbers)
        .await?;
    Ok(Json(PartUrlsResp { part_urls }))
}

/// `PUT /uploads/{id}/parts/{part_number}` — report a finished part.
pub async fn report_part(
    State(service): State<UploadService>,
    Authenticated(principal): Authenticated,
    AppPath((upload_id, part_number)): AppPath<(Uuid, i32)>,
    AppJson(body): AppJson<ReportPartReq>,
) -> Result<Json<UploadView>, AppError> {
    let view = service
        .report_part_uploaded(principal, upload_id, part_number, &body.etag)
        .await?;
    Ok(Json(view))
}

/// `POST /uploads/{id}/complete` — assemble the object.
pub async fn complete_upload(
    State(service): State<UploadService>,
    Authenticated(principal): Authenticated,
    AppPath(upload_id): AppPath<Uuid>,
    AppJson(body): AppJson<CompleteReq>,
) -> Result<Json<UploadView>, AppError> {
    let view = service.complete(principal, upload_id, body.parts).await?;
    Ok(Json(view))
}

/// `POST /uploads/{id}/abort` — cancel the upload.
pub async fn abort_upload(
    State(service): State<UploadService>,
    Authenticated(principal): Authenticated,
    AppPath(upload_id): AppPath<Uuid>,
) -> Result<Json<UploadView>, AppError> {
    let view = service.abort(principal, upload_id).await?;
    Ok(Json(view))
}

/// `PATCH /uploads/{id}` — edit title, description or visibility.
pub async fn update_upload(
    State(service): State<UploadService>,
    Authenticated(principal): Authenticated,
    AppPath(upload_id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateUpload>,
) -> Result<Json<UploadView>, AppError> {
    let view = service.update(principal, upload_id, body).await?;
    Ok(Json(view))
}

/// `DELETE /uploads/{id}`
pub async fn delete_upload(
    State(service): State<UploadService>,
    Authenticated(principal): Authenticated,
    AppPath(upload_id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete(principal, upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /uploads/{id}/parts` — per-part progress for the owner.
pub async fn list_parts(
    State(service): State<UploadService>,
    Authenticated(principal): Authenticated,
    AppPath(upload_id): AppPath<Uuid>,
) -> Result<Json<PartsResp>, AppError> {
    let parts = service.parts(principal, upload_id).await?;
    Ok(Json(PartsResp { parts }))
}

/// `GET /uploads/{id}`
pub async fn get_upload(
    State(service): State<UploadService>,
    Viewer(viewer): Viewer,
    AppPath(upload_id): AppPath<Uuid>,
) -> Result<Json<UploadView>, AppError> {
    let view = service.get(viewer, upload_id).await?;
    Ok(Json(view))
}

/// `GET /uploads` — supports ?status=&owner_id=&mine=&limit=&cursor=
pub async fn list_uploads(
    State(service): State<UploadService>,
    Viewer(viewer): Viewer,
    AppQuery(filter): AppQuery<ListFilter>,
) -> Result<Json<UploadList>, AppError> {
    let list = service.list(viewer, filter).await?;
    Ok(Json(list))
}
