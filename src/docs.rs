use axum::{routing::get, Json, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    auth::{self, dto as auth_dto},
    error::ErrorBody,
    products::{self, dto as product_dto, repo::Product},
    state::AppState,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Product catalog API",
        description = "Manage a catalog of products behind bearer-token authentication",
        version = "1.0.0"
    ),
    paths(
        auth::handlers::signup,
        auth::handlers::login,
        products::handlers::list_products,
        products::handlers::get_product,
        products::handlers::create_product,
        products::handlers::update_product,
        products::handlers::delete_product,
        products::handlers::delete_all_products,
    ),
    components(schemas(
        auth_dto::SignupRequest,
        auth_dto::LoginForm,
        auth_dto::SignupResponse,
        auth_dto::TokenResponse,
        Product,
        product_dto::ProductPayload,
        product_dto::ProductList,
        product_dto::ProductEnvelope,
        product_dto::ProductAdded,
        product_dto::ProductUpdated,
        product_dto::ProductDeleted,
        product_dto::MessageResponse,
        ErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Signup and token issuance"),
        (name = "products", description = "Product management endpoints")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme the product routes reference.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// `/openapi.json` plus a browsable reference at `/docs`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
