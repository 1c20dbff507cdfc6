//! REST API route handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use keeper_service::{BankCard, Credentials};
use keeper_store::{RecordContext, RecordId};

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn record_id(raw: &str) -> ApiResult<RecordId> {
    RecordId::parse(raw).map_err(|_| ApiError::BadRequest(format!("invalid record id: {raw:?}")))
}

fn created(id: RecordId) -> Response {
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Request body for `POST /api/register`.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
}

/// Request body for `POST /api/login`.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub name: String,
    pub password: String,
}

/// POST /api/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body(payload)?;
    let id = state.auth.register(&req.name, &req.password).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body(payload)?;
    let token = state.auth.login(&req.name, &req.password).await?;
    Ok(Json(json!({ "token": token })).into_response())
}

// ---------------------------------------------------------------------------
// Listing and deletion
// ---------------------------------------------------------------------------

/// One entry of `GET /api/keeper`.
#[derive(Serialize)]
pub struct ItemResponse {
    pub id: RecordId,
    pub title: String,
    pub meta: String,
    #[serde(rename = "type")]
    pub record_type: &'static str,
}

impl From<RecordContext> for ItemResponse {
    fn from(ctx: RecordContext) -> Self {
        Self {
            id: ctx.id,
            title: ctx.title,
            meta: ctx.meta,
            record_type: ctx.record_type.as_str(),
        }
    }
}

/// GET /api/keeper
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let items: Vec<ItemResponse> = state
        .keeper
        .list_all(&user.user_id)
        .await?
        .into_iter()
        .map(ItemResponse::from)
        .collect();
    Ok(Json(json!({ "items": items })))
}

/// DELETE /api/keeper/{id} and POST /api/keeper/delete/{id}
pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.keeper.delete(&user.user_id, &record_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Body of text requests and responses.
#[derive(Serialize, Deserialize)]
pub struct TextItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub meta: String,
    pub data: String,
}

/// POST /api/keeper/text
pub async fn set_text(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<TextItem>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body(payload)?;
    let id = state
        .keeper
        .set_text(&user.user_id, &req.title, &req.meta, req.data)
        .await?;
    Ok(created(id))
}

/// GET /api/keeper/text/{id}
pub async fn get_text(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TextItem>> {
    let secret = state.keeper.get_text(&user.user_id, &record_id(&id)?).await?;
    Ok(Json(TextItem {
        title: secret.context.title,
        meta: secret.context.meta,
        data: secret.value,
    }))
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Query parameters of `POST /api/keeper/file`.
#[derive(Deserialize)]
pub struct FileParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub meta: String,
}

/// POST /api/keeper/file
///
/// Accepts either a `multipart/form-data` body, whose `file` part is stored
/// (titled with the part's file name unless `?title=` is given), or any
/// other body, stored unmodified.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    params: Result<Query<FileParams>, QueryRejection>,
    request: Request,
) -> ApiResult<Response> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let (title, content) = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let (file_name, content) = file_part(multipart).await?;
        let title = if params.title.is_empty() {
            file_name
        } else {
            params.title
        };
        (title, content)
    } else {
        let content = Bytes::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        (params.title, content.to_vec())
    };

    let id = state
        .keeper
        .set_binary(&user.user_id, &title, &params.meta, content)
        .await?;
    Ok(created(id))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
}

/// Name and content of the first part called `file`.
async fn file_part(mut multipart: Multipart) -> ApiResult<(String, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok((file_name, content.to_vec()));
    }
    Err(ApiError::BadRequest(
        "multipart body has no \"file\" part".into(),
    ))
}

/// GET /api/keeper/file/{id}
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let secret = state
        .keeper
        .get_binary(&user.user_id, &record_id(&id)?)
        .await?;

    let filename = attachment_name(&secret.context);
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        secret.value,
    )
        .into_response())
}

/// File name for `Content-Disposition`: the title, or the record id if the
/// title has nothing printable in it.
fn attachment_name(ctx: &RecordContext) -> String {
    let cleaned: String = ctx
        .title
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .filter(|c| !matches!(c, '"' | '\\' | '/'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        ctx.id.to_string()
    } else {
        cleaned.to_string()
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Body of credentials requests and responses.
#[derive(Serialize, Deserialize)]
pub struct CredentialsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub meta: String,
    pub name: String,
    pub password: String,
}

/// POST /api/keeper/credentials
pub async fn set_credentials(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CredentialsItem>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body(payload)?;
    let credentials = Credentials {
        username: req.name,
        password: req.password,
    };
    let id = state
        .keeper
        .set_credentials(&user.user_id, &req.title, &req.meta, credentials)
        .await?;
    Ok(created(id))
}

/// GET /api/keeper/credentials/{id}
pub async fn get_credentials(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<CredentialsItem>> {
    let secret = state
        .keeper
        .get_credentials(&user.user_id, &record_id(&id)?)
        .await?;
    Ok(Json(CredentialsItem {
        title: secret.context.title,
        meta: secret.context.meta,
        name: secret.value.username,
        password: secret.value.password,
    }))
}

// ---------------------------------------------------------------------------
// Bank cards
// ---------------------------------------------------------------------------

/// Body of bank card requests and responses.
#[derive(Serialize, Deserialize)]
pub struct BankItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub meta: String,
    pub number: String,
    pub holder: String,
    #[serde(deserialize_with = "string_or_number")]
    pub cvv: String,
}

/// Accept `"012"` as well as `12` for fields older clients send as numbers.
fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

/// POST /api/keeper/bank
pub async fn set_bank(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<BankItem>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body(payload)?;
    let card = BankCard {
        number: req.number,
        holder: req.holder,
        cvv: req.cvv,
    };
    let id = state
        .keeper
        .set_bank_card(&user.user_id, &req.title, &req.meta, card)
        .await?;
    Ok(created(id))
}

/// GET /api/keeper/bank/{id}
pub async fn get_bank(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<BankItem>> {
    let secret = state
        .keeper
        .get_bank_card(&user.user_id, &record_id(&id)?)
        .await?;
    Ok(Json(BankItem {
        title: secret.context.title,
        meta: secret.context.meta,
        number: secret.value.number,
        holder: secret.value.holder,
        cvv: secret.value.cvv,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_store::{RecordType, UserId};

    fn ctx(title: &str) -> RecordContext {
        RecordContext {
            id: RecordId::parse("rec-1").unwrap(),
            user_id: UserId::new(),
            title: title.into(),
            meta: String::new(),
            record_type: RecordType::Binary,
        }
    }

    #[test]
    fn attachment_name_strips_header_breakers() {
        assert_eq!(attachment_name(&ctx("report.pdf")), "report.pdf");
        assert_eq!(attachment_name(&ctx("a\"b\r\nc.txt")), "abc.txt");
        assert_eq!(attachment_name(&ctx("../../etc/passwd")), "....etcpasswd");
        assert_eq!(attachment_name(&ctx("")), "rec-1");
        assert_eq!(attachment_name(&ctx("фото")), "rec-1");
    }

    #[test]
    fn cvv_accepts_number_or_string() {
        let from_number: BankItem =
            serde_json::from_str(r#"{"number":"4111","holder":"A","cvv":123}"#).unwrap();
        assert_eq!(from_number.cvv, "123");

        let from_string: BankItem =
            serde_json::from_str(r#"{"number":"4111","holder":"A","cvv":"012"}"#).unwrap();
        assert_eq!(from_string.cvv, "012");
        assert_eq!(from_string.title, "");
    }

    #[test]
    fn login_accepts_email_alias() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"email":"alice","password":"password123"}"#).unwrap();
        assert_eq!(req.name, "alice");
    }
}
