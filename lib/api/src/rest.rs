use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use hybrix_core::{Error, ExtractionError, Record, RecordId, QueryInputs, Schema, SpaceInfo};
use hybrix_query::{Executor, ParamValue, QueryTemplate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Serialize)]
struct IndexInfo {
    name: String,
    schema: Schema,
    spaces: Vec<SpaceInfo>,
    records_count: usize,
}

#[derive(Deserialize)]
struct PutRecordsRequest {
    records: Vec<Record>,
}

#[derive(Deserialize)]
struct TemplateRequest {
    template: QueryTemplate,
    #[serde(default)]
    params: BTreeMap<String, ParamValue>,
}

#[derive(Deserialize)]
struct NaturalRequest {
    query: String,
    template: QueryTemplate,
    #[serde(default)]
    params: BTreeMap<String, ParamValue>,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(executor: Arc<Executor>, port: u16) -> std::io::Result<()> {
        info!("REST API listening on 0.0.0.0:{}", port);
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(executor.clone()))
                .configure(configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Register every route; expects `web::Data<Arc<Executor>>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/indices", web::get().to(list_indices))
        .route("/indices/{name}", web::get().to(get_index))
        .route("/indices/{name}/records", web::put().to(put_records))
        .route("/indices/{name}/records/{id}", web::get().to(get_record))
        .route("/indices/{name}/records/{id}", web::delete().to(delete_record))
        .route("/indices/{name}/query", web::post().to(query))
        .route("/indices/{name}/template", web::post().to(query_template))
        .route("/indices/{name}/natural", web::post().to(query_natural));
}

fn status_of(e: &Error) -> StatusCode {
    match e {
        Error::IndexNotFound(_) | Error::RecordNotFound(_) => StatusCode::NOT_FOUND,
        Error::IndexExists(_) => StatusCode::CONFLICT,
        Error::InvalidPlan(_) => StatusCode::BAD_REQUEST,
        Error::Ingestion(_)
        | Error::InvalidRecord(_)
        | Error::MissingField { .. }
        | Error::OutOfDomain { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Extraction(ExtractionError::NotConfigured) => StatusCode::NOT_IMPLEMENTED,
        Error::Provider(_) | Error::Extraction(_) => StatusCode::BAD_GATEWAY,
        Error::IndexClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Configuration(_) | Error::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: Error) -> HttpResponse {
    let status = status_of(&e);
    debug!("Request failed with {}: {}", status, e);

    let mut body = serde_json::json!({ "error": e.to_string() });
    match &e {
        Error::InvalidPlan(violations) => {
            body["violations"] = violations.iter().map(|v| v.to_string()).collect();
        }
        Error::Ingestion(failures) => {
            body["failures"] = failures
                .iter()
                .map(|f| serde_json::json!({ "id": f.id, "error": f.error.to_string() }))
                .collect();
        }
        Error::Extraction(ExtractionError::InvalidParameters(issues)) => {
            body["issues"] = issues.iter().map(|i| i.to_string()).collect();
        }
        _ => {}
    }
    HttpResponse::build(status).json(body)
}

async fn list_indices(executor: web::Data<Arc<Executor>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(executor.list_indices()))
}

async fn get_index(
    executor: web::Data<Arc<Executor>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();

    match executor.index(&name) {
        Ok(index) => Ok(HttpResponse::Ok().json(IndexInfo {
            name: index.name().to_string(),
            schema: index.schema().clone(),
            spaces: index.describe_spaces(),
            records_count: index.len(),
        })),
        Err(e) => Ok(error_response(e)),
    }
}

async fn put_records(
    executor: web::Data<Arc<Executor>>,
    path: web::Path<String>,
    req: web::Json<PutRecordsRequest>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();
    let records = req.into_inner().records;

    match executor.put(&name, records).await {
        Ok(count) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "result": { "count": count }
        }))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn get_record(
    executor: web::Data<Arc<Executor>>,
    path: web::Path<(String, String)>,
) -> ActixResult<HttpResponse> {
    let (name, raw_id) = path.into_inner();

    let index = match executor.index(&name) {
        Ok(index) => index,
        Err(e) => return Ok(error_response(e)),
    };
    match RecordId::candidates(&raw_id).iter().find_map(|id| index.get(id)) {
        Some(record) => Ok(HttpResponse::Ok().json(serde_json::json!({ "result": record }))),
        None => Ok(error_response(Error::RecordNotFound(RecordId::parse(&raw_id)))),
    }
}

async fn delete_record(
    executor: web::Data<Arc<Executor>>,
    path: web::Path<(String, String)>,
) -> ActixResult<HttpResponse> {
    let (name, raw_id) = path.into_inner();

    for id in RecordId::candidates(&raw_id) {
        match executor.remove(&name, &id) {
            Ok(true) => return Ok(HttpResponse::Ok().json(serde_json::json!({ "result": true }))),
            Ok(false) => continue,
            Err(e) => return Ok(error_response(e)),
        }
    }
    Ok(error_response(Error::RecordNotFound(RecordId::parse(&raw_id))))
}

async fn query(
    executor: web::Data<Arc<Executor>>,
    path: web::Path<String>,
    req: web::Json<QueryInputs>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();

    match executor.query(&name, req.into_inner()).await {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => Ok(error_response(e)),
    }
}

async fn query_template(
    executor: web::Data<Arc<Executor>>,
    path: web::Path<String>,
    req: web::Json<TemplateRequest>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();
    let req = req.into_inner();

    match executor.query_template(&name, &req.template, &req.params).await {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => Ok(error_response(e)),
    }
}

async fn query_natural(
    executor: web::Data<Arc<Executor>>,
    path: web::Path<String>,
    req: web::Json<NaturalRequest>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();
    let req = req.into_inner();

    match executor
        .query_natural(&name, &req.template, &req.query, &req.params)
        .await
    {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => Ok(error_response(e)),
    }
}
