use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    extract::Validate,
    products::repo::{NewProduct, Product},
};

pub const MAX_PAGE_LIMIT: i64 = 100;

/// Body of `POST /products` and `PUT /products/:id`.
#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({"title": "Widget", "description": "A widget", "price": 9.99, "count": 5}))]
pub struct ProductPayload {
    pub title: String,
    pub description: String,
    /// Unit price, zero or more.
    #[schema(minimum = 0.0)]
    pub price: f64,
    /// Units in stock, zero or more.
    #[schema(minimum = 0)]
    pub count: i64,
}

impl Validate for ProductPayload {
    fn validate(&self) -> Result<(), String> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err("price must be a number greater than or equal to 0".into());
        }
        if self.count < 0 {
            return Err("count must be greater than or equal to 0".into());
        }
        Ok(())
    }
}

impl From<ProductPayload> for NewProduct {
    fn from(p: ProductPayload) -> Self {
        Self {
            title: p.title,
            description: p.description,
            price: p.price,
            count: p.count,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Number of products to skip from the beginning.
    #[serde(default)]
    #[param(minimum = 0, default = 0)]
    pub offset: i64,
    /// Maximum number of products to return; values above 100 are capped.
    #[serde(default = "default_limit")]
    #[param(minimum = 1, default = 10)]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

impl Pagination {
    pub fn clamped_limit(&self) -> i64 {
        self.limit.min(MAX_PAGE_LIMIT)
    }
}

impl Validate for Pagination {
    fn validate(&self) -> Result<(), String> {
        if self.offset < 0 {
            return Err("offset must be greater than or equal to 0".into());
        }
        if self.limit <= 0 {
            return Err("limit must be greater than 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductEnvelope {
    #[serde(rename = "Product")]
    pub product: Product,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductAdded {
    #[serde(rename = "Product Added")]
    pub id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductUpdated {
    #[serde(rename = "Product Updated")]
    pub id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDeleted {
    #[serde(rename = "Product Deleted")]
    pub id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: &'static str,
}
