use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::AdminSession;
use crate::content::{ImageConfigStore, JsonArrayStore};
use crate::error::ApiError;
use crate::gateway::{Section, UploadGateway};
use crate::matching::MatchEngine;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::session;
use crate::storage::{photo_key, PhotoStore};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::resource("/admin/auth")
                    .route(web::post().to(login))
                    .route(web::get().to(auth_check))
                    .route(web::delete().to(logout)),
            )
            .service(
                web::resource("/admin/images/sync")
                    .route(web::get().to(read_image_config))
                    .route(web::post().to(write_image_config)),
            )
            .service(
                web::resource("/admin/images")
                    .route(web::get().to(admin_list_images))
                    .route(web::post().to(upload_section_image))
                    .route(web::put().to(upload_section_image))
                    .route(web::delete().to(delete_section_image)),
            )
            .service(
                web::resource("/admin/events")
                    .route(web::get().to(admin_list_events))
                    .route(web::post().to(create_event)),
            )
            .service(web::resource("/admin/photos/upload").route(web::post().to(upload_photo)))
            .service(web::resource("/images").route(web::get().to(public_section_images)))
            .service(
                web::resource("/bookings")
                    .route(web::get().to(list_bookings))
                    .route(web::post().to(create_booking))
                    .route(web::patch().to(update_booking_status)),
            )
            .service(web::resource("/events").route(web::get().to(list_events)))
            .service(web::resource("/events/{slug}/photos").route(web::get().to(event_photos)))
            .service(web::resource("/face-search").route(web::post().to(face_search)))
            .service(
                web::resource("/gallery")
                    .route(web::get().to(list_gallery))
                    .route(web::post().to(replace_gallery)),
            )
            .service(
                web::resource("/projects")
                    .route(web::get().to(list_projects))
                    .route(web::post().to(replace_projects)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_config: Arc<dyn ImageConfigStore>,
    pub gallery: Arc<JsonArrayStore<GalleryImage>>,
    pub projects: Arc<JsonArrayStore<Project>>,
    pub gateway: Arc<dyn UploadGateway>,
    pub photo_store: Arc<dyn PhotoStore>,
    pub match_engine: Arc<dyn MatchEngine>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

// ---------------- auth -----------------------------------------------------

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct SessionInfo {
    pub authenticated: bool,
    pub user: String,
    pub expires_at: i64,
}

#[utoipa::path(
    post,
    path = "/api/admin/auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; session cookie set"),
        (status = 401, description = "Bad credentials"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        let ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        if !rl.allow_login(&ip) {
            log::warn!("login rate limited for {ip}");
            return Err(ApiError::TooManyRequests);
        }
    }

    let admin = match data.repo.find_admin(&payload.username).await {
        Ok(a) => a,
        Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    if !crate::password::verify_password(&payload.password, &admin.password_hash) {
        return Err(ApiError::Unauthorized);
    }

    let claims = session::Claims::new(&admin.username, session::SESSION_TTL_SECS);
    let token = session::sign(&claims, &session::secret_from_env());
    Ok(HttpResponse::Ok()
        .cookie(session::session_cookie(token))
        .json(serde_json::json!({
            "user": { "id": admin.id, "username": admin.username }
        })))
}

#[utoipa::path(
    get,
    path = "/api/admin/auth",
    responses(
        (status = 200, description = "Active session", body = SessionInfo),
        (status = 401, description = "No valid session")
    )
)]
pub async fn auth_check(session: AdminSession) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(SessionInfo {
        authenticated: true,
        user: session.0.username,
        expires_at: session.0.expires_at,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/admin/auth",
    responses((status = 200, description = "Session cookie cleared"))
)]
pub async fn logout() -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok()
        .cookie(session::clearing_cookie())
        .json(serde_json::json!({"status": "ok"})))
}

// ---------------- section imagery ------------------------------------------

const SECTION_IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB
const PHOTO_SIZE_LIMIT: usize = 25 * 1024 * 1024; // 25 MB originals

const ALLOWED_IMAGE_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

struct MultipartForm {
    file: Option<(Vec<u8>, Option<String>)>, // bytes + client file name
    text: HashMap<String, String>,
}

/// Collects one file field plus any text fields from a multipart body,
/// enforcing the size limit while streaming.
async fn read_multipart(
    payload: &mut Multipart,
    file_field: &str,
    size_limit: usize,
) -> Result<MultipartForm, ApiError> {
    let mut form = MultipartForm { file: None, text: HashMap::new() };
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        let Some(name) = field.content_disposition().get_name().map(str::to_string) else {
            continue;
        };
        if name == file_field {
            let file_name = field.content_disposition().get_filename().map(str::to_string);
            let mut bytes: Vec<u8> = Vec::new();
            while let Some(chunk) = field.try_next().await.map_err(|e| {
                log::error!("stream read error: {e}");
                ApiError::Internal
            })? {
                if bytes.len() + chunk.len() > size_limit {
                    return Err(ApiError::PayloadTooLarge);
                }
                bytes.extend_from_slice(&chunk);
            }
            form.file = Some((bytes, file_name));
        } else {
            let mut buf: Vec<u8> = Vec::new();
            while let Some(chunk) = field.try_next().await.map_err(|e| {
                log::error!("stream read error: {e}");
                ApiError::Internal
            })? {
                buf.extend_from_slice(&chunk);
            }
            form.text.insert(name, String::from_utf8_lossy(&buf).into_owned());
        }
    }
    Ok(form)
}

fn required_text<'a>(form: &'a MultipartForm, field: &str) -> Result<&'a str, ApiError> {
    match form.text.get(field).map(String::as_str) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("missing field: {field}"))),
    }
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct SectionImageResponse {
    pub section: String,
    pub image_id: String,
    pub url: String,
    pub public_id: String,
}

#[utoipa::path(
    post,
    path = "/api/admin/images",
    responses(
        (status = 200, description = "Image stored and config updated", body = SectionImageResponse),
        (status = 400, description = "Missing/invalid field"),
        (status = 401, description = "No valid session"),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Unsupported media type")
    )
)]
pub async fn upload_section_image(
    _session: AdminSession,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_multipart(&mut payload, "file", SECTION_IMAGE_SIZE_LIMIT).await?;
    let section_str = required_text(&form, "section")?;
    let section = Section::parse(section_str)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown section: {section_str}")))?;
    let image_name = required_text(&form, "image_name")?.to_string();
    let old_public_id = form.text.get("old_public_id").filter(|s| !s.trim().is_empty()).cloned();

    let (bytes, _) = form
        .file
        .filter(|(b, _)| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing field: file".into()))?;
    let mime = infer::get(&bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    if !ALLOWED_IMAGE_MIME.contains(&mime.as_str()) {
        return Err(ApiError::UnsupportedMediaType);
    }

    // Best-effort removal of the replaced object. A failed delete leaks a
    // remote object; that is accepted, but it is logged, never swallowed.
    if let Some(old) = &old_public_id {
        if let Err(e) = data.gateway.delete(old).await {
            log::warn!("failed to delete replaced image '{old}': {e} (orphaned remote object)");
        }
    }

    let uploaded = data.gateway.upload(section, &image_name, bytes).await.map_err(|e| {
        log::error!("cdn upload failed for {}/{image_name}: {e}", section.as_str());
        ApiError::Internal
    })?;

    data.image_config
        .put(
            section.as_str(),
            &image_name,
            ImageRef { url: uploaded.url.clone(), public_id: uploaded.public_id.clone() },
        )
        .await?;

    Ok(HttpResponse::Ok().json(SectionImageResponse {
        section: section.as_str().to_string(),
        image_id: image_name,
        url: uploaded.url,
        public_id: uploaded.public_id,
    }))
}

#[derive(serde::Deserialize)]
pub struct SectionImageQuery {
    pub section: Option<String>,
}

pub async fn admin_list_images(
    _session: AdminSession,
    data: web::Data<AppState>,
    query: web::Query<SectionImageQuery>,
) -> Result<HttpResponse, ApiError> {
    match query.section.as_deref() {
        Some(section_str) => {
            let section = Section::parse(section_str)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown section: {section_str}")))?;
            Ok(HttpResponse::Ok().json(data.image_config.section(section.as_str()).await?))
        }
        None => Ok(HttpResponse::Ok().json(data.image_config.snapshot().await?)),
    }
}

#[derive(serde::Deserialize)]
pub struct DeleteImageQuery {
    pub section: String,
    pub image_id: String,
}

pub async fn delete_section_image(
    _session: AdminSession,
    data: web::Data<AppState>,
    query: web::Query<DeleteImageQuery>,
) -> Result<HttpResponse, ApiError> {
    let section = Section::parse(&query.section)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown section: {}", query.section)))?;
    let entries = data.image_config.section(section.as_str()).await?;
    if let Some(entry) = entries.get(&query.image_id) {
        if let Err(e) = data.gateway.delete(&entry.public_id).await {
            log::warn!(
                "failed to delete image '{}': {e} (orphaned remote object)",
                entry.public_id
            );
        }
        data.image_config.remove(section.as_str(), &query.image_id).await?;
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok"})))
}

pub async fn read_image_config(
    _session: AdminSession,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.image_config.snapshot().await?))
}

pub async fn write_image_config(
    _session: AdminSession,
    data: web::Data<AppState>,
    payload: web::Json<ImageConfig>,
) -> Result<HttpResponse, ApiError> {
    data.image_config.replace(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok"})))
}

#[utoipa::path(
    get,
    path = "/api/images",
    params(("section" = String, Query, description = "Page section")),
    responses(
        (status = 200, description = "Active images for the section (empty map when none)"),
        (status = 400, description = "Missing/unknown section")
    )
)]
pub async fn public_section_images(
    data: web::Data<AppState>,
    query: web::Query<SectionImageQuery>,
) -> Result<HttpResponse, ApiError> {
    let section_str = query
        .section
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing query param: section".into()))?;
    let section = Section::parse(section_str)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown section: {section_str}")))?;
    Ok(HttpResponse::Ok().json(data.image_config.section(section.as_str()).await?))
}

// ---------------- bookings --------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = NewBooking,
    responses(
        (status = 201, description = "Booking created", body = Booking),
        (status = 400, description = "Missing required field")
    )
)]
pub async fn create_booking(
    data: web::Data<AppState>,
    payload: web::Json<NewBooking>,
) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    for (field, value) in [
        ("name", &new.name),
        ("email", &new.email),
        ("event_type", &new.event_type),
        ("message", &new.message),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("missing field: {field}")));
        }
    }
    let booking = data.repo.create_booking(new).await?;
    Ok(HttpResponse::Created().json(booking))
}

#[utoipa::path(
    get,
    path = "/api/bookings",
    responses(
        (status = 200, description = "All bookings, newest first", body = [Booking]),
        (status = 401, description = "No valid session")
    )
)]
pub async fn list_bookings(
    _session: AdminSession,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_bookings().await?))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct UpdateBookingStatus {
    pub id: Id,
    pub status: String,
}

#[utoipa::path(
    patch,
    path = "/api/bookings",
    request_body = UpdateBookingStatus,
    responses(
        (status = 200, description = "Booking updated", body = Booking),
        (status = 400, description = "Invalid status"),
        (status = 401, description = "No valid session"),
        (status = 404, description = "Booking not found")
    )
)]
pub async fn update_booking_status(
    _session: AdminSession,
    data: web::Data<AppState>,
    payload: web::Json<UpdateBookingStatus>,
) -> Result<HttpResponse, ApiError> {
    let status = BookingStatus::parse(&payload.status)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid status: {}", payload.status)))?;
    let booking = data.repo.update_booking_status(payload.id, status).await?;
    Ok(HttpResponse::Ok().json(booking))
}

// ---------------- events & photos -------------------------------------------

pub async fn admin_list_events(
    _session: AdminSession,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_events().await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/events",
    request_body = NewEvent,
    responses(
        (status = 201, description = "Event created", body = Event),
        (status = 400, description = "Missing required field"),
        (status = 401, description = "No valid session"),
        (status = 409, description = "Slug already taken")
    )
)]
pub async fn create_event(
    _session: AdminSession,
    data: web::Data<AppState>,
    payload: web::Json<NewEvent>,
) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    for (field, value) in [("name", &new.name), ("slug", &new.slug), ("date", &new.date)] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("missing field: {field}")));
        }
    }
    let event = data.repo.create_event(new).await?;
    Ok(HttpResponse::Created().json(event))
}

pub async fn list_events(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_events().await?))
}

pub async fn event_photos(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let event = data
        .repo
        .get_event_by_slug(&path.into_inner())
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound,
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(data.repo.list_photos(event.id).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/photos/upload",
    responses(
        (status = 201, description = "Photo stored and recorded", body = Photo),
        (status = 400, description = "Missing/invalid field"),
        (status = 401, description = "No valid session"),
        (status = 404, description = "Event not found"),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Not an image")
    )
)]
pub async fn upload_photo(
    _session: AdminSession,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_multipart(&mut payload, "file", PHOTO_SIZE_LIMIT).await?;
    let event_id: Id = required_text(&form, "event_id")?
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid field: event_id".into()))?;
    let event = data.repo.get_event(event_id).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound,
        other => other.into(),
    })?;

    let (bytes, file_name) = form
        .file
        .filter(|(b, _)| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing field: file".into()))?;
    let mime = infer::get(&bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    if !mime.starts_with("image/") {
        return Err(ApiError::UnsupportedMediaType);
    }

    let original_name = file_name.unwrap_or_else(|| "photo".into());
    let key = photo_key(event.id, &original_name);
    let url = data.photo_store.save(&key, &mime, &bytes).await.map_err(|e| {
        log::error!("photo store save error: {e}");
        ApiError::Internal
    })?;

    let photo = data
        .repo
        .add_photo(NewPhoto { event_id: event.id, url, storage_key: key, original_name })
        .await?;
    Ok(HttpResponse::Created().json(photo))
}

// ---------------- face search (placeholder engine) ---------------------------

const FACE_SEARCH_LIMIT: usize = 12;

#[utoipa::path(
    post,
    path = "/api/face-search",
    responses(
        (status = 200, description = "Candidate photos", body = [Photo]),
        (status = 400, description = "Missing selfie"),
        (status = 415, description = "Not an image")
    )
)]
pub async fn face_search(
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_multipart(&mut payload, "selfie", SECTION_IMAGE_SIZE_LIMIT).await?;
    let (bytes, _) = form
        .file
        .filter(|(b, _)| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing field: selfie".into()))?;
    let mime = infer::get(&bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    if !mime.starts_with("image/") {
        return Err(ApiError::UnsupportedMediaType);
    }
    let matches = data.match_engine.find_matches(&bytes, FACE_SEARCH_LIMIT).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "matches": matches })))
}

// ---------------- portfolio arrays -------------------------------------------

pub async fn list_gallery(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.gallery.list()?))
}

pub async fn replace_gallery(
    _session: AdminSession,
    data: web::Data<AppState>,
    payload: web::Json<Vec<GalleryImage>>,
) -> Result<HttpResponse, ApiError> {
    data.gallery.replace(&payload.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok"})))
}

pub async fn list_projects(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.projects.list()?))
}

pub async fn replace_projects(
    _session: AdminSession,
    data: web::Data<AppState>,
    payload: web::Json<Vec<Project>>,
) -> Result<HttpResponse, ApiError> {
    data.projects.replace(&payload.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok"})))
}
