pub mod models;
pub mod repository;
pub mod routes;

use async_trait::async_trait;
use axum::Router;
use catalog_db::SqlitePool;
use catalog_kernel::{InitCtx, Module, SchemaStatement};
use serde_json::json;

/// Book catalog: one table, five endpoints
pub struct BooksModule {
    pool: SqlitePool,
}

impl BooksModule {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.pool.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn schema(&self) -> Vec<SchemaStatement> {
        repository::schema()
    }

    async fn start(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if ctx.settings.database.seed_sample_data {
            let mut conn = ctx.db.acquire().await?;
            let seeded = repository::seed_samples(&mut conn).await?;
            tracing::info!(module = self.name(), seeded, "sample books loaded");
        }

        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(pool: SqlitePool) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(BooksModule::new(pool))
}

fn openapi_fragment() -> serde_json::Value {
    let error_response = |description: &str| {
        json!({
            "description": description,
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                }
            }
        })
    };
    let book_response = |description: &str| {
        json!({
            "description": description,
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/Book" }
                }
            }
        })
    };
    let id_parameter = json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "integer", "format": "int64" }
    });
    let body = |schema: &str| {
        json!({
            "required": true,
            "content": {
                "application/json": {
                    "schema": { "$ref": format!("#/components/schemas/{}", schema) }
                }
            }
        })
    };

    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "parameters": [
                        {
                            "name": "skip",
                            "in": "query",
                            "required": false,
                            "schema": { "type": "integer", "minimum": 0, "default": models::DEFAULT_SKIP }
                        },
                        {
                            "name": "limit",
                            "in": "query",
                            "required": false,
                            "schema": { "type": "integer", "minimum": 1, "default": models::DEFAULT_LIMIT }
                        }
                    ],
                    "responses": {
                        "200": {
                            "description": "Books in id order",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "array",
                                        "items": { "$ref": "#/components/schemas/Book" }
                                    }
                                }
                            }
                        },
                        "400": error_response("Malformed pagination parameters"),
                        "422": error_response("Pagination out of range"),
                        "503": error_response("Storage unavailable")
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": body("CreateBook"),
                    "responses": {
                        "201": book_response("Created book"),
                        "400": error_response("Malformed JSON"),
                        "422": error_response("Validation error"),
                        "503": error_response("Storage unavailable")
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Get a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter.clone()],
                    "responses": {
                        "200": book_response("The book"),
                        "404": error_response("Book not found"),
                        "503": error_response("Storage unavailable")
                    }
                },
                "put": {
                    "summary": "Update the supplied fields of a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter.clone()],
                    "requestBody": body("UpdateBook"),
                    "responses": {
                        "200": book_response("Updated book"),
                        "404": error_response("Book not found"),
                        "422": error_response("Validation error"),
                        "503": error_response("Storage unavailable")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter],
                    "responses": {
                        "204": { "description": "Deleted" },
                        "404": error_response("Book not found"),
                        "503": error_response("Storage unavailable")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "year": { "type": "integer" },
                        "genre": { "type": "string" },
                        "description": { "type": ["string", "null"] }
                    },
                    "required": ["id", "title", "author", "year", "genre", "description"]
                },
                "CreateBook": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "minLength": 1, "maxLength": models::TITLE_MAX_CHARS },
                        "author": { "type": "string", "minLength": 1, "maxLength": models::AUTHOR_MAX_CHARS },
                        "year": {
                            "type": "integer",
                            "minimum": models::EARLIEST_YEAR,
                            "description": "No later than the current calendar year"
                        },
                        "genre": { "type": "string", "minLength": 1, "maxLength": models::GENRE_MAX_CHARS },
                        "description": { "type": ["string", "null"] }
                    },
                    "required": ["title", "author", "year", "genre"]
                },
                "UpdateBook": {
                    "type": "object",
                    "description": "Only the fields present are changed",
                    "properties": {
                        "title": { "type": "string", "minLength": 1, "maxLength": models::TITLE_MAX_CHARS },
                        "author": { "type": "string", "minLength": 1, "maxLength": models::AUTHOR_MAX_CHARS },
                        "year": { "type": "integer", "minimum": models::EARLIEST_YEAR },
                        "genre": { "type": "string", "minLength": 1, "maxLength": models::GENRE_MAX_CHARS },
                        "description": { "type": ["string", "null"] }
                    }
                }
            }
        }
    })
}
