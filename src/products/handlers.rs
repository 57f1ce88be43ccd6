use axum::{extract::State, routing::get, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::jwt::AuthUser,
    error::{ApiError, ErrorBody},
    extract::{ProductId, ValidJson, ValidQuery},
    products::{
        dto::{
            MessageResponse, Pagination, ProductAdded, ProductDeleted, ProductEnvelope,
            ProductList, ProductPayload, ProductUpdated,
        },
        repo::{NewProduct, ProductError},
    },
    state::AppState,
};

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/products",
            get(list_products)
                .post(create_product)
                .delete(delete_all_products),
        )
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

/// Maps a store error to its HTTP form; `context` is the only text a client
/// sees for storage failures.
fn product_error(context: &'static str) -> impl Fn(ProductError) -> ApiError {
    move |e| match e {
        ProductError::NotFound(_) => ApiError::NotFound(e.to_string()),
        ProductError::DuplicateContent => {
            warn!("{context}: duplicate content");
            ApiError::BadRequest(e.to_string())
        }
        ProductError::Storage(source) => ApiError::internal(context, source),
    }
}

/// List products in insertion order.
#[utoipa::path(
    get,
    path = "/products",
    tag = "products",
    params(Pagination),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Page of products", body = ProductList),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 422, description = "Invalid offset or limit", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    ValidQuery(page): ValidQuery<Pagination>,
) -> Result<Json<ProductList>, ApiError> {
    let products = state
        .products
        .list(page.offset, page.clamped_limit())
        .await
        .map_err(product_error("Database query failed"))?;
    Ok(Json(ProductList { products }))
}

/// Fetch one product by id.
#[utoipa::path(
    get,
    path = "/products/{id}",
    tag = "products",
    params(("id" = i64, Path, description = "Product id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The product", body = ProductEnvelope),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "No product with that id", body = ErrorBody),
        (status = 422, description = "Id is not an integer", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    ProductId(id): ProductId,
) -> Result<Json<ProductEnvelope>, ApiError> {
    let product = state
        .products
        .get_by_id(id)
        .await
        .map_err(product_error("Database query failed"))?
        .ok_or_else(|| ApiError::NotFound(ProductError::NotFound(id).to_string()))?;
    Ok(Json(ProductEnvelope { product }))
}

/// Add a product; identical content to an existing product is rejected.
#[utoipa::path(
    post,
    path = "/products",
    tag = "products",
    request_body = ProductPayload,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Id of the new product", body = ProductAdded),
        (status = 400, description = "Duplicate product", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 422, description = "Invalid product fields", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
#[instrument(skip(state, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    ValidJson(payload): ValidJson<ProductPayload>,
) -> Result<Json<ProductAdded>, ApiError> {
    let product = state
        .products
        .create(&NewProduct::from(payload))
        .await
        .map_err(product_error("Error creating product"))?;
    info!(product_id = product.id, %username, "product created");
    Ok(Json(ProductAdded { id: product.id }))
}

/// Replace all fields of a product.
#[utoipa::path(
    put,
    path = "/products/{id}",
    tag = "products",
    params(("id" = i64, Path, description = "Product id")),
    request_body = ProductPayload,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Id of the updated product", body = ProductUpdated),
        (status = 400, description = "Another product has the same content", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "No product with that id", body = ErrorBody),
        (status = 422, description = "Invalid id or product fields", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
#[instrument(skip(state, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    ProductId(id): ProductId,
    ValidJson(payload): ValidJson<ProductPayload>,
) -> Result<Json<ProductUpdated>, ApiError> {
    let product = state
        .products
        .update(id, &NewProduct::from(payload))
        .await
        .map_err(product_error("Error updating product"))?;
    info!(product_id = product.id, %username, "product updated");
    Ok(Json(ProductUpdated { id: product.id }))
}

/// Delete one product by id.
#[utoipa::path(
    delete,
    path = "/products/{id}",
    tag = "products",
    params(("id" = i64, Path, description = "Product id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Id of the deleted product", body = ProductDeleted),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "No product with that id", body = ErrorBody),
        (status = 422, description = "Id is not an integer", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    ProductId(id): ProductId,
) -> Result<Json<ProductDeleted>, ApiError> {
    let deleted = state
        .products
        .delete_by_id(id)
        .await
        .map_err(product_error("Error deleting product"))?;
    info!(product_id = deleted, %username, "product deleted");
    Ok(Json(ProductDeleted { id: deleted }))
}

/// Delete every product.
#[utoipa::path(
    delete,
    path = "/products",
    tag = "products",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All products removed", body = MessageResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
#[instrument(skip(state))]
pub async fn delete_all_products(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let removed = state
        .products
        .delete_all()
        .await
        .map_err(product_error("Error deleting all products"))?;
    info!(removed, %username, "all products deleted");
    Ok(Json(MessageResponse {
        message: "All products deleted successfully",
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{header, StatusCode};
    use serde_json::{json, Value};

    use crate::testing::{send_empty, send_json, FailingProductStore, TestApp};

    fn widget() -> Value {
        json!({ "title": "Widget", "description": "A widget", "price": 9.99, "count": 5 })
    }

    #[tokio::test]
    async fn widget_lifecycle() {
        let app = TestApp::new();
        let token = app.token().await;
        let token = Some(token.as_str());

        let (status, _, body) = send_json(&app, "POST", "/products", token, widget()).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["Product Added"].as_i64().expect("assigned id");

        let uri = format!("/products/{id}");
        let (status, _, body) = send_empty(&app, "GET", &uri, token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "Product": {
                "id": id, "title": "Widget", "description": "A widget", "price": 9.99, "count": 5
            }})
        );

        let (status, _, body) = send_empty(&app, "DELETE", &uri, token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "Product Deleted": id }));

        let (status, _, body) = send_empty(&app, "GET", &uri, token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], format!("Product {id} not found"));
    }

    #[tokio::test]
    async fn every_product_route_requires_a_token() {
        let app = TestApp::new();
        let routes = [
            ("GET", "/products"),
            ("GET", "/products/1"),
            ("POST", "/products"),
            ("PUT", "/products/1"),
            ("DELETE", "/products/1"),
            ("DELETE", "/products"),
        ];
        for (method, uri) in routes {
            let (status, headers, body) = send_json(&app, method, uri, None, widget()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
            assert_eq!(body["detail"], "Could not validate credentials");
        }
    }

    #[tokio::test]
    async fn forged_and_expired_tokens_are_rejected() {
        let app = TestApp::new();
        let expired = app
            .state
            .jwt
            .issue_at(
                "testuser",
                time::Duration::minutes(1),
                time::macros::datetime!(2020-01-01 0:00 UTC),
            )
            .unwrap();
        for token in [expired.as_str(), "not-a-token"] {
            let (status, _, _) = send_empty(&app, "GET", "/products", Some(token)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn duplicate_content_is_a_bad_request() {
        let app = TestApp::new();
        let token = app.token().await;
        let token = Some(token.as_str());

        send_json(&app, "POST", "/products", token, widget()).await;
        let (status, _, body) = send_json(&app, "POST", "/products", token, widget()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["detail"],
            "Product with the same title, description, price, and count already exists"
        );

        let cheaper = json!({ "title": "Widget", "description": "A widget", "price": 1.0, "count": 5 });
        let (status, _, _) = send_json(&app, "POST", "/products", token, cheaper).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn out_of_range_values_never_reach_storage() {
        let app = TestApp::new();
        let token = app.token().await;
        let token = Some(token.as_str());

        let bodies = [
            json!({ "title": "W", "description": "d", "price": -1.0, "count": 1 }),
            json!({ "title": "W", "description": "d", "price": 1.0, "count": -1 }),
            json!({ "title": "W", "description": "d", "price": 1.0 }),
            json!({ "title": "W", "description": "d", "price": "cheap", "count": 1 }),
        ];
        for body in bodies {
            let (status, _, _) = send_json(&app, "POST", "/products", token, body.clone()).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        }

        let (_, _, body) = send_empty(&app, "GET", "/products", token).await;
        assert_eq!(body, json!({ "products": [] }));
    }

    #[tokio::test]
    async fn update_replaces_fields_and_reports_id() {
        let app = TestApp::new();
        let token = app.token().await;
        let token = Some(token.as_str());

        let (_, _, body) = send_json(&app, "POST", "/products", token, widget()).await;
        let id = body["Product Added"].as_i64().unwrap();
        let uri = format!("/products/{id}");

        let updated = json!({
            "title": "Updated Product", "description": "An updated product", "price": 12.99, "count": 80
        });
        let (status, _, body) = send_json(&app, "PUT", &uri, token, updated).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "Product Updated": id }));

        let (_, _, body) = send_empty(&app, "GET", &uri, token).await;
        assert_eq!(body["Product"]["title"], "Updated Product");
        assert_eq!(body["Product"]["count"], 80);

        // re-saving the same values is not a conflict with itself
        let (status, _, _) = send_json(
            &app,
            "PUT",
            &uri,
            token,
            json!({ "title": "Updated Product", "description": "An updated product", "price": 12.99, "count": 80 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn update_conflicts_with_other_product_and_missing_id() {
        let app = TestApp::new();
        let token = app.token().await;
        let token = Some(token.as_str());

        send_json(&app, "POST", "/products", token, widget()).await;
        let other = json!({ "title": "Other", "description": "x", "price": 1.0, "count": 1 });
        let (_, _, body) = send_json(&app, "POST", "/products", token, other).await;
        let other_id = body["Product Added"].as_i64().unwrap();

        let uri = format!("/products/{other_id}");
        let (status, _, _) = send_json(&app, "PUT", &uri, token, widget()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = send_json(&app, "PUT", "/products/999", token, widget()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Product 999 not found");
    }

    #[tokio::test]
    async fn deleting_twice_is_not_found() {
        let app = TestApp::new();
        let token = app.token().await;
        let token = Some(token.as_str());

        let (_, _, body) = send_json(&app, "POST", "/products", token, widget()).await;
        let uri = format!("/products/{}", body["Product Added"]);
        let (status, _, _) = send_empty(&app, "DELETE", &uri, token).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send_empty(&app, "DELETE", &uri, token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_integer_id_is_rejected() {
        let app = TestApp::new();
        let token = app.token().await;
        let (status, _, body) = send_empty(&app, "GET", "/products/abc", Some(&token)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["detail"], "Invalid product id: abc");
    }

    #[tokio::test]
    async fn listing_paginates_and_delete_all_empties() {
        let app = TestApp::new();
        let token = app.token().await;
        let token = Some(token.as_str());

        for i in 0..12 {
            let body = json!({ "title": format!("P{i}"), "description": "d", "price": i, "count": i });
            let (status, _, _) = send_json(&app, "POST", "/products", token, body).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, _, body) = send_empty(&app, "GET", "/products", token).await;
        assert_eq!(body["products"].as_array().unwrap().len(), 10);

        let (_, _, body) = send_empty(&app, "GET", "/products?offset=10&limit=5", token).await;
        let titles: Vec<&str> = body["products"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["P10", "P11"]);

        for bad in ["/products?offset=-1", "/products?limit=0", "/products?limit=many"] {
            let (status, _, _) = send_empty(&app, "GET", bad, token).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{bad}");
        }

        let (status, _, body) = send_empty(&app, "DELETE", "/products", token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "All products deleted successfully" }));

        let (_, _, body) = send_empty(&app, "GET", "/products?offset=0&limit=100", token).await;
        assert_eq!(body, json!({ "products": [] }));
    }

    #[tokio::test]
    async fn storage_failures_do_not_leak_driver_detail() {
        let app = TestApp::with_products(Arc::new(FailingProductStore));
        let token = app.token().await;
        let token = Some(token.as_str());

        let cases = [
            ("GET", "/products", "Database query failed"),
            ("GET", "/products/1", "Database query failed"),
            ("POST", "/products", "Error creating product"),
            ("PUT", "/products/1", "Error updating product"),
            ("DELETE", "/products/1", "Error deleting product"),
            ("DELETE", "/products", "Error deleting all products"),
        ];
        for (method, uri, message) in cases {
            let (status, _, body) = send_json(&app, method, uri, token, widget()).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{method} {uri}");
            assert_eq!(body, json!({ "detail": message }));
            assert!(!body.to_string().contains("10.0.0.5"));
        }
    }
}
