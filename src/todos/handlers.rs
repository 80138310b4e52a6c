use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::{CreateTodoRequest, UpdateTodoRequest};
use super::repo::Todo;
use crate::{
    auth::dto::MessageResponse, auth::extractors::CurrentUser, error::ApiError, state::AppState,
};

pub fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/:id", get(get_todo).put(update_todo).delete(delete_todo))
}

#[instrument(skip(state, user))]
pub async fn list_todos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = Todo::list_by_user(&state.db, user.id).await?;
    Ok(Json(todos))
}

#[instrument(skip(state, user))]
pub async fn get_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, ApiError> {
    let todo = Todo::find_owned(&state.db, user.id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;
    Ok(Json(todo))
}

#[instrument(skip(state, user, payload))]
pub async fn create_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateTodoRequest>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }

    let todo = Todo::create(
        &state.db,
        user.id,
        title,
        payload.description.as_deref(),
        payload.completed,
    )
    .await?;

    info!(user_id = user.id, todo_id = todo.id, "todo created");
    Ok((StatusCode::CREATED, Json(todo)))
}

#[instrument(skip(state, user, payload))]
pub async fn update_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTodoRequest>,
) -> Result<Json<Todo>, ApiError> {
    let current = Todo::find_owned(&state.db, user.id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;

    let title = match &payload.title {
        Some(t) => {
            let t = t.trim();
            if t.is_empty() {
                return Err(ApiError::validation("Title is required"));
            }
            t.to_string()
        }
        None => current.title,
    };
    let description = payload.description.or(current.description);
    let completed = payload.completed.unwrap_or(current.completed);

    let todo = Todo::update_owned(
        &state.db,
        user.id,
        id,
        &title,
        description.as_deref(),
        completed,
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Todo not found"))?;

    info!(user_id = user.id, todo_id = todo.id, "todo updated");
    Ok(Json(todo))
}

#[instrument(skip(state, user))]
pub async fn delete_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = Todo::delete_owned(&state.db, user.id, id).await?;
    if !deleted {
        return Err(ApiError::not_found("Todo not found"));
    }

    info!(user_id = user.id, todo_id = id, "todo deleted");
    Ok(Json(MessageResponse::new("Todo deleted successfully")))
}
