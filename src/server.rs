// http server mode - guarded execution over an api
// one connection shared by every request, serialized by a mutex

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::core::{Database, Outcome, Param, Policy, QueryResult, Skip};
use crate::Error;

struct AppState {
    db: Mutex<Database>,
}

#[derive(Deserialize)]
struct QueryRequest {
    sql: String,
    #[serde(default)]
    params: Vec<Param>,
    #[serde(default)]
    batch: bool,
}

#[derive(Serialize, Default)]
struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<Skip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: String,
}

pub struct Server;

impl Server {
    pub async fn run(db: Database, host: &str, port: u16) -> Result<(), Error> {
        let app = Self::router(db);

        let addr = format!("{host}:{port}");
        info!("server running at http://{addr}");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        Ok(())
    }

    pub fn router(db: Database) -> Router {
        let state = Arc::new(AppState { db: Mutex::new(db) });

        Router::new()
            .route("/health", get(health))
            .route("/query", post(query))
            .route("/policy", get(get_policy).put(put_policy))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db = state.db.lock().await;
    Json(HealthResponse {
        status: "ok",
        database: db.name().to_string(),
    })
}

async fn get_policy(State(state): State<Arc<AppState>>) -> Json<Policy> {
    Json(state.db.lock().await.policy().clone())
}

async fn put_policy(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<Policy>,
) -> Json<Policy> {
    let mut db = state.db.lock().await;
    db.set_policy(policy);
    Json(db.policy().clone())
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<QueryResponse>) {
    let mut db = state.db.lock().await;

    let outcome = if req.batch {
        db.execute_batch(&req.sql, &req.params).await
    } else {
        db.execute(&req.sql, &req.params).await
    };

    match outcome {
        Ok(Outcome::Completed(result)) => (
            StatusCode::OK,
            Json(QueryResponse {
                result: Some(result),
                ..Default::default()
            }),
        ),
        Ok(Outcome::Skipped(skip)) => (
            StatusCode::OK,
            Json(QueryResponse {
                skipped: Some(skip),
                ..Default::default()
            }),
        ),
        Err(e) => {
            let status = match e {
                Error::PolicyDenied(_) => StatusCode::FORBIDDEN,
                Error::Database(_) | Error::ShadowCopy { .. } => StatusCode::BAD_REQUEST,
                Error::MultipleStatements(_) | Error::ClassificationAmbiguous(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(QueryResponse {
                    error: Some(e.to_string()),
                    ..Default::default()
                }),
            )
        }
    }
}
