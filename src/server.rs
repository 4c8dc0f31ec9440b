use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::data::StudentRecord;
use crate::error::EngineError;
use crate::orchestrator::{AssignmentMetadata, Orchestrator};
use crate::summary::{self, ClassSummary};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignQuery {
    classes_number: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentResponse {
    classes: Vec<Vec<StudentRecord>>,
    summaries: Vec<ClassSummary>,
    metadata: AssignmentMetadata,
}

async fn classrooms_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<AssignQuery>,
    Json(students): Json<Vec<StudentRecord>>,
) -> Result<Json<AssignmentResponse>, (StatusCode, Json<Value>)> {
    // The solvers block; keep them off the async workers.
    let result = tokio::task::spawn_blocking(move || {
        let roster =
            crate::validator::validate(&students, query.classes_number, orchestrator.config())?;
        let outcome = orchestrator.solve_roster(&roster, query.classes_number as usize)?;
        let classes = outcome
            .assignment
            .classes()
            .iter()
            .map(|members| members.iter().map(|&m| students[m].clone()).collect())
            .collect();
        Ok(AssignmentResponse {
            classes,
            summaries: summary::class_summaries(&roster, &outcome.assignment),
            metadata: outcome.metadata,
        })
    })
    .await;

    match result {
        Ok(Ok(response)) => Ok(Json(response)),
        Ok(Err(err)) => Err(error_response(err)),
        Err(join_err) => {
            error!("assignment task panicked: {}", join_err);
            Err(error_response(EngineError::internal("assignment task failed")))
        }
    }
}

fn error_response(err: EngineError) -> (StatusCode, Json<Value>) {
    let status = if err.code.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.code == crate::error::ErrorCode::InternalServerError {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(err.to_envelope()))
}

pub async fn run_server() {
    let orchestrator = Arc::new(Orchestrator::from_env());

    let app = Router::new()
        .route("/classrooms", post(classrooms_handler))
        .layer(CorsLayer::permissive())
        .with_state(orchestrator);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080")
        .await
        .unwrap();

    println!("Server running at http://{}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
