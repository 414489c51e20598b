//! JSON extractor that validates the payload before the handler runs
//!
//! Body and validation failures surface as 422 `AppError`s so they share the
//! error envelope with everything else.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use docqa_common::errors::AppError;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

/// `Json<T>` followed by `T::validate()`
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(rejection_error)?;

        value.validate().map_err(validation_error)?;
        Ok(Self(value))
    }
}

fn rejection_error(rejection: JsonRejection) -> AppError {
    let text = rejection.body_text();

    if let JsonRejection::JsonDataError(_) = rejection {
        if let Some(field) = missing_field(&text) {
            return AppError::MissingField { field };
        }
    }

    AppError::Validation {
        message: text,
        field: None,
    }
}

/// Field name out of serde's "missing field `name`" message
fn missing_field(text: &str) -> Option<String> {
    let rest = text.split("missing field `").nth(1)?;
    let field = rest.split('`').next()?;
    (!field.is_empty()).then(|| field.to_string())
}

/// First failing field in name order, as `"{field} {message}"`
fn validation_error(errors: ValidationErrors) -> AppError {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    match fields.first() {
        Some((field, errs)) => {
            let reason = errs
                .first()
                .map(|err| match err.message {
                    Some(ref message) => message.to_string(),
                    None => format!("is invalid ({})", err.code),
                })
                .unwrap_or_else(|| "is invalid".to_string());

            AppError::Validation {
                message: format!("{} {}", field, reason),
                field: Some(field.to_string()),
            }
        }
        None => AppError::Validation {
            message: errors.to_string(),
            field: None,
        },
    }
}
