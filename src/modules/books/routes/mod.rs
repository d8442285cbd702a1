//! HTTP handlers for the books resource.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use catalog_db::{SqlitePool, StorageError};
use catalog_http::error::AppError;
use garde::Validate;
use serde_json::json;
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;

use super::models::{BookView, CreateBook, ListParams, UpdateBook};
use super::repository;

const NOT_FOUND_MESSAGE: &str = "Book not found";

#[derive(Clone)]
pub struct BooksState {
    pool: SqlitePool,
}

/// Routes relative to the module mount point.
pub fn router(pool: SqlitePool) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/{id}", get(read_book).put(update_book).delete(delete_book))
        .with_state(BooksState { pool })
}

async fn list_books(
    State(state): State<BooksState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<BookView>>, AppError> {
    let Query(params) = params?;
    params.validate().map_err(validation_error)?;

    let mut conn = acquire(&state.pool).await?;
    let books = repository::list(&mut conn, params.skip, params.limit).await?;

    Ok(Json(books.into_iter().map(BookView::from).collect()))
}

async fn read_book(
    State(state): State<BooksState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<BookView>, AppError> {
    let id = book_id(id)?;

    let mut conn = acquire(&state.pool).await?;
    match repository::get(&mut conn, id).await? {
        Some(book) => Ok(Json(book.into())),
        None => Err(AppError::not_found(NOT_FOUND_MESSAGE)),
    }
}

async fn create_book(
    State(state): State<BooksState>,
    payload: Result<Json<CreateBook>, JsonRejection>,
) -> Result<(StatusCode, Json<BookView>), AppError> {
    let Json(new_book) = payload?;
    new_book.validate().map_err(validation_error)?;

    let mut conn = acquire(&state.pool).await?;
    let book = repository::create(&mut conn, new_book).await?;
    tracing::info!(book_id = book.id, "book created");

    Ok((StatusCode::CREATED, Json(book.into())))
}

async fn update_book(
    State(state): State<BooksState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateBook>, JsonRejection>,
) -> Result<Json<BookView>, AppError> {
    let id = book_id(id)?;
    let Json(changes) = payload?;
    changes.validate().map_err(validation_error)?;

    let mut conn = acquire(&state.pool).await?;
    match repository::update(&mut conn, id, changes).await? {
        Some(book) => {
            tracing::info!(book_id = book.id, "book updated");
            Ok(Json(book.into()))
        }
        None => Err(AppError::not_found(NOT_FOUND_MESSAGE)),
    }
}

async fn delete_book(
    State(state): State<BooksState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let id = book_id(id)?;

    let mut conn = acquire(&state.pool).await?;
    if repository::delete(&mut conn, id).await? {
        tracing::info!(book_id = id, "book deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(NOT_FOUND_MESSAGE))
    }
}

/// One pooled connection per request, returned to the pool on drop.
async fn acquire(pool: &SqlitePool) -> Result<PoolConnection<Sqlite>, AppError> {
    Ok(pool.acquire().await.map_err(StorageError::from)?)
}

fn book_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    id.map(|Path(id)| id)
        .map_err(|_| AppError::bad_request("invalid book id"))
}

fn validation_error(report: garde::Report) -> AppError {
    let details = report
        .iter()
        .map(|(path, error)| json!({ "field": path.to_string(), "error": error.to_string() }))
        .collect();
    AppError::validation(details, "book validation failed")
}

#[cfg(test)]
mod tests {
    use super::super::create_module;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use catalog_db::SqlitePool;
    use catalog_kernel::settings::{DatabaseSettings, Settings};
    use catalog_kernel::ModuleRegistry;
    use serde_json::{json, Value};
    use time::OffsetDateTime;
    use tower::ServiceExt;

    async fn app() -> (Router, SqlitePool) {
        app_with(DatabaseSettings::in_memory()).await
    }

    async fn app_with(database: DatabaseSettings) -> (Router, SqlitePool) {
        let pool = catalog_db::connect(&database).await.unwrap();
        let mut registry = ModuleRegistry::new();
        registry.register(create_module(pool.clone()));
        catalog_db::apply_schema(&pool, &registry.collect_schema())
            .await
            .unwrap();

        let router = catalog_http::build_router(&registry, &Settings::default());
        (router, pool)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(raw) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(raw.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send_json(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        send(app, method, uri, Some(&body.to_string())).await
    }

    fn error_fields(body: &Value) -> Vec<String> {
        body["error"]["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|detail| detail["field"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn dune_lifecycle() {
        let (app, _pool) = app().await;

        let (status, created) = send_json(
            &app,
            Method::POST,
            "/api/v1/books",
            json!({"title": "Dune", "author": "Herbert", "year": 1965, "genre": "SciFi"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created["id"].is_i64());
        assert!(created["description"].is_null());
        let uri = format!("/api/v1/books/{}", created["id"]);

        let (status, updated) = send_json(&app, Method::PUT, &uri, json!({"year": 1966})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["year"], 1966);
        assert_eq!(updated["title"], "Dune");
        assert_eq!(updated["author"], "Herbert");
        assert_eq!(updated["genre"], "SciFi");

        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
        assert_eq!(body["error"]["message"], "Book not found");
    }

    #[tokio::test]
    async fn get_returns_created_book() {
        let (app, _pool) = app().await;
        let (_, created) = send_json(
            &app,
            Method::POST,
            "/api/v1/books",
            json!({
                "title": "Emma", "author": "Austen", "year": 1815,
                "genre": "Romance", "description": "Matchmaking"
            }),
        )
        .await;

        let (status, fetched) =
            send(&app, Method::GET, &format!("/api/v1/books/{}", created["id"]), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_rejects_year_after_current_year() {
        let (app, _pool) = app().await;
        let next_year = OffsetDateTime::now_utc().year() + 1;

        let (status, body) = send_json(
            &app,
            Method::POST,
            "/api/v1/books",
            json!({"title": "Tomorrow", "author": "Nobody", "year": next_year, "genre": "SciFi"}),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "validation_error");
        assert_eq!(error_fields(&body), vec!["year"]);
    }

    #[tokio::test]
    async fn create_rejects_missing_and_malformed_bodies() {
        let (app, _pool) = app().await;

        let (status, body) =
            send_json(&app, Method::POST, "/api/v1/books", json!({"title": "Dune"})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "validation_error");

        let (status, body) = send(&app, Method::POST, "/api/v1/books", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");

        let (_, listed) = send(&app, Method::GET, "/api/v1/books", None).await;
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn update_rejects_invalid_fields_without_mutating() {
        let (app, _pool) = app().await;
        let (_, created) = send_json(
            &app,
            Method::POST,
            "/api/v1/books",
            json!({"title": "Dune", "author": "Herbert", "year": 1965, "genre": "SciFi"}),
        )
        .await;
        let uri = format!("/api/v1/books/{}", created["id"]);

        let (status, body) =
            send_json(&app, Method::PUT, &uri, json!({"title": null, "year": 1966})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_fields(&body), vec!["title"]);

        let (_, fetched) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn empty_update_is_a_no_op() {
        let (app, _pool) = app().await;
        let (_, created) = send_json(
            &app,
            Method::POST,
            "/api/v1/books",
            json!({"title": "Dune", "author": "Herbert", "year": 1965, "genre": "SciFi"}),
        )
        .await;

        let (status, updated) = send_json(
            &app,
            Method::PUT,
            &format!("/api/v1/books/{}", created["id"]),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated, created);
    }

    #[tokio::test]
    async fn missing_ids_map_to_not_found() {
        let (app, _pool) = app().await;

        let (status, _) = send(&app, Method::GET, "/api/v1/books/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send_json(&app, Method::PUT, "/api/v1/books/999", json!({"year": 2000})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, "/api/v1/books/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_numeric_id_is_bad_request() {
        let (app, _pool) = app().await;

        let (status, body) = send(&app, Method::GET, "/api/v1/books/dune", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "invalid book id");
    }

    #[tokio::test]
    async fn list_honours_pagination() {
        let (app, _pool) = app().await;
        for title in ["A", "B", "C"] {
            send_json(
                &app,
                Method::POST,
                "/api/v1/books",
                json!({"title": title, "author": "Anon", "year": 2000, "genre": "Misc"}),
            )
            .await;
        }

        let (status, all) = send(&app, Method::GET, "/api/v1/books", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 3);

        let (_, page) = send(&app, Method::GET, "/api/v1/books?skip=1&limit=1", None).await;
        assert_eq!(page.as_array().unwrap().len(), 1);
        assert_eq!(page[0]["title"], "B");

        let (status, beyond) = send(&app, Method::GET, "/api/v1/books?skip=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(beyond, json!([]));
    }

    #[tokio::test]
    async fn list_rejects_bad_pagination() {
        let (app, _pool) = app().await;

        let (status, body) = send(&app, Method::GET, "/api/v1/books?limit=0", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_fields(&body), vec!["limit"]);

        let (status, _) = send(&app, Method::GET, "/api/v1/books?skip=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn storage_outage_is_a_generic_server_error() {
        let (app, pool) = app().await;
        pool.close().await;

        let (status, body) = send(&app, Method::GET, "/api/v1/books", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "storage_unavailable");
        assert!(!body["error"]["message"]
            .as_str()
            .unwrap()
            .to_lowercase()
            .contains("pool"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_on_a_file_database_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let database = DatabaseSettings {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("books.db").display()),
            ..DatabaseSettings::default()
        };
        let (app, pool) = app_with(database).await;

        let (status, created) = send_json(
            &app,
            Method::POST,
            "/api/v1/books",
            json!({"title": "Dune", "author": "Herbert", "year": 1965, "genre": "SciFi"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/v1/books/{}", created["id"]);

        let mut updates = tokio::task::JoinSet::new();
        for offset in 0..100 {
            let app = app.clone();
            let uri = uri.clone();
            updates.spawn(async move {
                send_json(&app, Method::PUT, &uri, json!({"year": 1000 + offset})).await
            });
        }

        let mut failures = Vec::new();
        while let Some(result) = updates.join_next().await {
            let (status, body) = result.unwrap();
            if status != StatusCode::OK {
                failures.push((status, body));
            }
        }
        assert!(failures.is_empty(), "{:?}", failures);

        let (_, stored) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(stored["title"], "Dune");
        assert!((1000..1100).contains(&stored["year"].as_i64().unwrap()));
        pool.close().await;
    }

    #[tokio::test]
    async fn trailing_slash_redirects_to_the_collection() {
        let (app, _pool) = app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/books/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/api/v1/books");

        let (status, _) = send(&app, Method::GET, "/api/v1/books/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
