use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Form, Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Shape and range checks a payload runs before it reaches storage.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// JSON body that has been deserialized and passed [`Validate`].
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        data.validate().map_err(ApiError::Validation)?;
        Ok(ValidJson(data))
    }
}

/// URL-encoded form body that has been deserialized and passed [`Validate`].
pub struct ValidForm<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidForm<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(data) = Form::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        data.validate().map_err(ApiError::Validation)?;
        Ok(ValidForm(data))
    }
}

/// Query string that has been deserialized and passed [`Validate`].
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(data) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        data.validate().map_err(ApiError::Validation)?;
        Ok(ValidQuery(data))
    }
}

/// Integer `:id` path segment.
pub struct ProductId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for ProductId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        raw.parse::<i64>()
            .map(ProductId)
            .map_err(|_| ApiError::Validation(format!("Invalid product id: {raw}")))
    }
}
