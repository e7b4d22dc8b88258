//! Student CRUD routes under `/db/students`.
//!
//! Bodies are read as raw JSON so that "field absent" and "field null" stay
//! distinguishable for partial updates.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::ApiError;
use crate::http::AppState;
use crate::store::{NewStudent, Student, StudentPatch, StoreError};

const MISSING_FIELDS: &str = "Missing required fields: fullname, student_id";
const NOT_FOUND: &str = "Student not found";
const DELETED: &str = "Student deleted successfully";

fn invalid_data(reason: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(format!("Database error or invalid data: {reason}"))
}

fn database_error(err: StoreError) -> ApiError {
    ApiError::Internal(format!("Database error: {err}"))
}

/// Ids that are not integers cannot name a record.
fn parse_id(raw: &str) -> Result<i32, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(NOT_FOUND.to_string()))
}

fn parse_object(body: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// `null` and `""` mean "no date".
pub(crate) fn parse_dob(value: &Value) -> Result<Option<NaiveDate>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => s
            .parse::<NaiveDate>()
            .map(Some)
            .map_err(|_| format!("Invalid isoformat string: '{s}'")),
        other => Err(format!("dob must be an ISO date string, got {other}")),
    }
}

fn optional_string(field: &str, value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(format!("{field} must be a string, got {other}")),
    }
}

fn required_string(field: &str, value: &Value) -> Result<String, String> {
    optional_string(field, value)?.ok_or_else(|| format!("{field} must not be null"))
}

pub(crate) fn new_student_from(body: &Map<String, Value>) -> Result<NewStudent, String> {
    let (Some(student_id), Some(fullname)) = (body.get("student_id"), body.get("fullname")) else {
        return Err(MISSING_FIELDS.to_string());
    };

    Ok(NewStudent {
        student_id: required_string("student_id", student_id)?,
        fullname: required_string("fullname", fullname)?,
        major: body
            .get("major")
            .map(|v| optional_string("major", v))
            .transpose()?
            .flatten(),
        dob: body.get("dob").map(parse_dob).transpose()?.flatten(),
    })
}

pub(crate) fn patch_from(body: &Map<String, Value>) -> Result<StudentPatch, String> {
    let text = |field: &str| {
        body.get(field)
            .map(|v| optional_string(field, v))
            .transpose()
    };

    Ok(StudentPatch {
        student_id: text("student_id")?,
        fullname: text("fullname")?,
        major: text("major")?,
        dob: body.get("dob").map(parse_dob).transpose()?,
    })
}

/// `POST /db/students/add-student`
pub async fn create(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    let body = parse_object(&body)
        .filter(|map| !map.is_empty())
        .ok_or_else(|| ApiError::BadRequest(MISSING_FIELDS.to_string()))?;

    if !body.contains_key("fullname") || !body.contains_key("student_id") {
        return Err(ApiError::BadRequest(MISSING_FIELDS.to_string()));
    }

    let new = new_student_from(&body).map_err(invalid_data)?;
    let student = state.store.create(new).await.map_err(invalid_data)?;

    info!(id = student.id, "Student created");
    Ok((StatusCode::CREATED, Json(student)))
}

/// `GET /db/students/get-all`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Student>>, ApiError> {
    let students = state.store.list().await.map_err(database_error)?;
    Ok(Json(students))
}

/// `GET /db/students/get/:id`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Student>, ApiError> {
    let id = parse_id(&id)?;
    state
        .store
        .get(id)
        .await
        .map_err(database_error)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_string()))
}

/// `POST /db/students/update/:id`: only fields present in the body change.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Student>, ApiError> {
    let id = parse_id(&id)?;

    if state.store.get(id).await.map_err(invalid_data)?.is_none() {
        return Err(ApiError::NotFound(NOT_FOUND.to_string()));
    }

    let body = parse_object(&body)
        .ok_or_else(|| invalid_data("request body must be a JSON object"))?;
    let patch = patch_from(&body).map_err(invalid_data)?;

    let student = state
        .store
        .update(id, patch)
        .await
        .map_err(invalid_data)?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_string()))?;

    info!(id, "Student updated");
    Ok(Json(student))
}

/// `POST /db/students/delete/:id`
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;

    if !state.store.delete(id).await.map_err(database_error)? {
        return Err(ApiError::NotFound(NOT_FOUND.to_string()));
    }

    info!(id, "Student deleted");
    Ok(Json(json!({ "message": DELETED })))
}
