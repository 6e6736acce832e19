use std::{convert::Infallible, sync::Arc};

use crate::{
    authentication::{jwt::SessionData, middleware::with_session, permissions::ActionType},
    config::Config,
    constants::SHOPPING_LIST_FILENAME,
    error::{Error, ErrorKind, FieldErrors},
    shopping::{
        aggregation::shopping_list,
        document::{render_shopping_list, DocumentAssets},
    },
};

use serde::Serialize;
use sqlx::{Pool, Postgres};
use warp::{
    http::{header, Response, StatusCode},
    reject::Rejection,
    Filter, Reply,
};

#[derive(Serialize, Debug)]
struct ErrorBody<'a> {
    detail: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a FieldErrors>,
}

fn pdf_response(bytes: Vec<u8>) -> Result<Response<Vec<u8>>, Error> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
        )
        .body(bytes)
        .map_err(|e| {
            log::error!("failed to build pdf response: {e}");
            ErrorKind::InternalServerError.default()
        })
}

/// Aggregates the session user's shopping cart and renders it as a PDF.
pub async fn shopping_cart_document(
    session: &SessionData,
    pool: &Pool<Postgres>,
    config: &Config,
) -> Result<Vec<u8>, Error> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;

    let rows = shopping_list(session.user_id, pool).await?;
    let assets = DocumentAssets::load(&config.assets)?;
    let bytes = render_shopping_list(&rows, &assets)?;

    log::info!(
        "user {} downloaded a shopping list with {} rows",
        session.user_id,
        rows.len()
    );
    Ok(bytes)
}

pub async fn download_shopping_cart(
    session: SessionData,
    pool: Pool<Postgres>,
    config: Arc<Config>,
) -> Result<Response<Vec<u8>>, Rejection> {
    let bytes = shopping_cart_document(&session, &pool, &config)
        .await
        .map_err(warp::reject::custom)?;

    pdf_response(bytes).map_err(warp::reject::custom)
}

/// `GET /recipes/download_shopping_cart/`, authenticated.
pub fn download_shopping_cart_route(
    pool: Pool<Postgres>,
    config: Arc<Config>,
) -> impl Filter<Extract = (Response<Vec<u8>>,), Error = Rejection> + Clone {
    let jwt = Arc::new(config.jwt.clone());

    warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(jwt))
        .and(warp::any().map(move || pool.clone()))
        .and(warp::any().map(move || config.clone()))
        .and_then(download_shopping_cart)
}

/// Turns rejections into `{"detail": ..., "errors": {...}}` bodies with the
/// matching status code.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let error = if let Some(error) = err.find::<Error>() {
        error.clone()
    } else if err.is_not_found() {
        ErrorKind::NotFound.default()
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ErrorKind::InvalidRequest.new("Method not allowed")
    } else {
        log::error!("unhandled rejection: {err:?}");
        ErrorKind::InternalServerError.default()
    };

    let body = ErrorBody {
        detail: error.info.as_deref().unwrap_or("unknown error"),
        errors: error.fields.as_ref(),
    };
    let status = StatusCode::from_u16(error.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AssetConfig, DatabaseConfig, JwtConfig, PaginationConfig},
        database::validation::ValidationErrors,
    };
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;

    fn config() -> Arc<Config> {
        Arc::new(Config {
            database: DatabaseConfig {
                url: String::from("postgres://localhost/foodgram"),
                max_connections: 1,
            },
            jwt: JwtConfig {
                secret: String::from("reply-secret"),
                expiry_hours: 1,
            },
            pagination: PaginationConfig::default(),
            assets: AssetConfig::default(),
        })
    }

    fn lazy_pool(config: &Config) -> Pool<Postgres> {
        PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy(&config.database.url)
            .unwrap()
    }

    #[test]
    fn pdf_response_is_an_attachment() {
        let response = pdf_response(b"%PDF-1.5".to_vec()).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"shopping_list.pdf\""
        );
    }

    #[tokio::test]
    async fn download_requires_a_session() {
        let config = config();
        let route = download_shopping_cart_route(lazy_pool(&config), config).recover(handle_rejection);

        let response = warp::test::request()
            .method("GET")
            .path("/recipes/download_shopping_cart/")
            .reply(&route)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["detail"], "Authentication credentials were not provided");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn garbage_tokens_are_rejected() {
        let config = config();
        let route = download_shopping_cart_route(lazy_pool(&config), config).recover(handle_rejection);

        let response = warp::test::request()
            .path("/recipes/download_shopping_cart")
            .header("authorization", "Bearer not-a-token")
            .reply(&route)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn field_errors_are_reported() {
        let error: Error = ValidationErrors::single("author", "You cannot subscribe to yourself").into();
        let response = handle_rejection(warp::reject::custom(error))
            .await
            .unwrap()
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["errors"]["author"][0], "You cannot subscribe to yourself");
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let response = handle_rejection(warp::reject::not_found())
            .await
            .unwrap()
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
