use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};

use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use async_graphql_warp::{GraphQLBadRequest, GraphQLResponse};
use chrono::FixedOffset;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};
use warp::{
    filters::body::BodyDeserializeError,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    reject::UnsupportedMediaType,
    reply::{self, Reply, Response},
    Filter, Rejection,
};

use crate::{
    advisor::{AdviceError, Advisor, INTERNAL_ERROR_MESSAGE},
    api::Schema,
    database::Database,
    export::{write_csv, ExportFilter},
    features::FeatureRecord,
};

const MAX_BODY_SIZE: u64 = 16 * 1024;
const ALL_CSV_NAME: &str = "all_houses_predictions.csv";
const FILTERED_CSV_NAME: &str = "filtered_houses_predictions.csv";

/// Everything the HTTP handlers share.
#[derive(Clone)]
pub(crate) struct State {
    pub(crate) schema: Schema,
    pub(crate) advisor: Arc<Advisor>,
    pub(crate) db: Database,
    pub(crate) offset: FixedOffset,
}

/// Runs the web server until the process exits. Serves HTTPS when both a
/// certificate and a key are given.
pub(crate) async fn serve(state: State, addr: SocketAddr, tls: Option<(PathBuf, PathBuf)>) {
    let routes = routes(state);
    if let Some((cert, key)) = tls {
        info!("Serving HTTPS on {addr}");
        warp::serve(routes)
            .tls()
            .cert_path(cert)
            .key_path(key)
            .run(addr)
            .await;
    } else {
        info!("Serving HTTP on {addr}");
        warp::serve(routes).run(addr).await;
    }
}

pub(crate) fn routes(state: State) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let graphql = warp::path!("graphql")
        .and(warp::post())
        .and(async_graphql_warp::graphql(state.schema.clone()))
        .and_then(|(schema, request): (Schema, async_graphql::Request)| async move {
            Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
        });

    let playground = warp::path!("graphql" / "playground")
        .and(warp::get())
        .map(|| reply::html(playground_source(GraphQLPlaygroundConfig::new("/graphql"))));

    let advisor = state.advisor.clone();
    let predict = warp::path!("predict")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_SIZE))
        .and(warp::body::json())
        .map(move |body: Value| predict(&advisor, &body));

    let db = state.db.clone();
    let offset = state.offset;
    let download_all = warp::path!("download_all_csv")
        .and(warp::get())
        .map(move || csv_download(&db, &ExportFilter::default(), offset, ALL_CSV_NAME));

    let db = state.db;
    let download_filtered = warp::path!("download_filtered_csv")
        .and(warp::get())
        .and(warp::query::<ExportFilter>())
        .map(move |filter: ExportFilter| csv_download(&db, &filter, offset, FILTERED_CSV_NAME));

    graphql
        .or(playground)
        .or(predict)
        .or(download_all)
        .or(download_filtered)
        .recover(handle_rejection)
}

#[derive(Serialize)]
struct PredictBody<'a> {
    predicted_price: f64,
    confidence_interval: [f64; 2],
    recommendations: &'a [String],
    realtor_url: &'a str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn error_reply(message: &str, status: StatusCode) -> Response {
    reply::with_status(reply::json(&ErrorBody { error: message }), status).into_response()
}

fn predict(advisor: &Advisor, body: &Value) -> Response {
    debug!("Received JSON data: {body}");
    let result = FeatureRecord::from_json(body)
        .map_err(AdviceError::from)
        .and_then(|(features, purpose)| advisor.advise(features, purpose));
    match result {
        Ok(advice) => reply::json(&PredictBody {
            predicted_price: advice.prediction.point_estimate,
            confidence_interval: [
                advice.prediction.interval_low,
                advice.prediction.interval_high,
            ],
            recommendations: &advice.recommendations,
            realtor_url: &advice.realtor_url,
        })
        .into_response(),
        Err(e) if e.is_client_error() => {
            debug!("Rejected prediction request: {e}");
            error_reply(&e.public_message(), StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            error!("Prediction failed: {e}");
            error_reply(&e.public_message(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn csv_download(
    db: &Database,
    filter: &ExportFilter,
    offset: FixedOffset,
    file_name: &str,
) -> Response {
    let result = db.recent_queries().and_then(|entries| {
        let mut body = Vec::new();
        let rows = write_csv(&entries, filter, offset, &mut body)?;
        debug!("Exporting {rows} of {} predictions to {file_name}", entries.len());
        Ok(body)
    });
    match result {
        Ok(body) => {
            let body = reply::with_header(body, CONTENT_TYPE, "text/csv");
            reply::with_header(
                body,
                CONTENT_DISPOSITION,
                format!("attachment; filename={file_name}"),
            )
            .into_response()
        }
        Err(e) => {
            error!("Error generating CSV: {e:#}");
            error_reply(INTERNAL_ERROR_MESSAGE, StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn handle_rejection(err: Rejection) -> Result<Response, Rejection> {
    if err.find::<BodyDeserializeError>().is_some()
        || err.find::<UnsupportedMediaType>().is_some()
    {
        return Ok(error_reply("Invalid request format", StatusCode::BAD_REQUEST));
    }
    if let Some(GraphQLBadRequest(e)) = err.find::<GraphQLBadRequest>() {
        return Ok(reply::with_status(e.to_string(), StatusCode::BAD_REQUEST).into_response());
    }
    Err(err)
}
