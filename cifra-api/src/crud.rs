//! Request validation gate
//!
//! Every entity handler funnels its request through a [`CrudController`]: the
//! path parameters, query string and JSON body are merged into one candidate
//! object (body over query over path), validated against the operation's
//! schema, and paired with the caller's identity. Nothing reaches the data
//! layer unless validation succeeds.

use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, RawPathParams, Request},
    http::{HeaderMap, StatusCode},
};
use cifra_common::validation::{self, Candidate, Schema, ValidationErrors};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;

/// Account and user on whose behalf a request runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub id_account: i64,
    pub id_user: i64,
}

/// Resolves the caller of a request
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> CallerIdentity;
}

/// Single-tenant identity: every request runs as the same account and user
#[derive(Debug, Clone, Copy)]
pub struct FixedIdentity(pub CallerIdentity);

impl Default for FixedIdentity {
    fn default() -> Self {
        Self(CallerIdentity {
            id_account: 1,
            id_user: 1,
        })
    }
}

impl IdentityProvider for FixedIdentity {
    fn identify(&self, _headers: &HeaderMap) -> CallerIdentity {
        self.0
    }
}

/// What the caller is trying to do with the securable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Read,
    Update,
    Delete,
}

impl Intent {
    pub fn permission(&self) -> &'static str {
        match self {
            Intent::Create => "CREATE",
            Intent::Read => "READ",
            Intent::Update => "UPDATE",
            Intent::Delete => "DELETE",
        }
    }
}

/// Raw request inputs, before validation
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub path: Candidate,
    pub query: Candidate,
    pub body: Candidate,
    pub headers: HeaderMap,
}

impl RawRequest {
    /// Single candidate object; on key collisions body beats query beats path
    pub fn merged(&self) -> Candidate {
        let mut merged = self.path.clone();
        merged.extend(self.query.clone());
        merged.extend(self.body.clone());
        merged
    }
}

#[async_trait]
impl<S> FromRequest<S> for RawRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        let path = match RawPathParams::from_request_parts(&mut parts, state).await {
            Ok(params) => params
                .iter()
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect(),
            Err(_) => Candidate::new(),
        };

        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        let query = pairs
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();

        let headers = parts.headers.clone();
        let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(|rejection| {
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    ApiError::PayloadTooLarge(rejection.body_text())
                } else {
                    ApiError::BadRequest(rejection.body_text())
                }
            })?;

        Ok(RawRequest {
            path,
            query,
            body: parse_body(&bytes)?,
            headers,
        })
    }
}

/// Empty body reads as `{}`; anything else must be a JSON object
fn parse_body(bytes: &[u8]) -> Result<Candidate, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Candidate::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(ApiError::BadRequest(format!("Malformed JSON body: {}", e))),
    }
}

/// A request that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedOperation<T> {
    pub credential: CallerIdentity,
    pub params: T,
}

/// Validation gate for one securable entity
pub struct CrudController {
    securable: &'static str,
    identity: Arc<dyn IdentityProvider>,
}

impl CrudController {
    pub fn new(securable: &'static str, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            securable,
            identity,
        }
    }

    pub fn securable(&self) -> &'static str {
        self.securable
    }

    pub fn create<T: Schema>(&self, req: &RawRequest) -> Result<ValidatedOperation<T>, ValidationErrors> {
        self.validate(req, Intent::Create)
    }

    pub fn read<T: Schema>(&self, req: &RawRequest) -> Result<ValidatedOperation<T>, ValidationErrors> {
        self.validate(req, Intent::Read)
    }

    pub fn update<T: Schema>(&self, req: &RawRequest) -> Result<ValidatedOperation<T>, ValidationErrors> {
        self.validate(req, Intent::Update)
    }

    pub fn delete<T: Schema>(&self, req: &RawRequest) -> Result<ValidatedOperation<T>, ValidationErrors> {
        self.validate(req, Intent::Delete)
    }

    /// Validate the merged request inputs against `T`
    pub fn validate<T: Schema>(
        &self,
        req: &RawRequest,
        intent: Intent,
    ) -> Result<ValidatedOperation<T>, ValidationErrors> {
        let params = validation::validate::<T>(&req.merged()).map_err(|errors| {
            debug!(
                securable = self.securable,
                permission = intent.permission(),
                issues = errors.issues.len(),
                "Request rejected by validation"
            );
            errors
        })?;

        Ok(ValidatedOperation {
            credential: self.identity.identify(&req.headers),
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cifra_common::validation::Fields;
    use serde_json::json;

    #[derive(Debug)]
    struct IdOnly {
        id: i64,
    }

    impl Schema for IdOnly {
        fn parse(fields: &mut Fields<'_>) -> Self {
            IdOnly {
                id: fields.foreign_key("id"),
            }
        }
    }

    fn candidate(value: Value) -> Candidate {
        match value {
            Value::Object(fields) => fields,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_merge_precedence_body_over_query_over_path() {
        let req = RawRequest {
            path: candidate(json!({"id": "1", "a": "path"})),
            query: candidate(json!({"id": "2", "b": "query"})),
            body: candidate(json!({"id": 3})),
            headers: HeaderMap::new(),
        };
        let merged = req.merged();
        assert_eq!(merged["id"], json!(3));
        assert_eq!(merged["a"], "path");
        assert_eq!(merged["b"], "query");
    }

    #[test]
    fn test_gate_attaches_identity() {
        let controller = CrudController::new("SONG", Arc::new(FixedIdentity::default()));
        let req = RawRequest {
            path: candidate(json!({"id": "42"})),
            ..Default::default()
        };
        let op = controller.read::<IdOnly>(&req).unwrap();
        assert_eq!(op.params.id, 42);
        assert_eq!(op.credential, CallerIdentity { id_account: 1, id_user: 1 });
    }

    #[test]
    fn test_gate_rejects_invalid_id() {
        let controller = CrudController::new("SONG", Arc::new(FixedIdentity::default()));
        let req = RawRequest {
            path: candidate(json!({"id": "abc"})),
            ..Default::default()
        };
        let errors = controller.delete::<IdOnly>(&req).unwrap_err();
        assert!(errors.has_field("id"));
    }

    #[test]
    fn test_parse_body() {
        assert!(parse_body(b"").unwrap().is_empty());
        assert!(parse_body(b"  \n").unwrap().is_empty());
        assert_eq!(parse_body(br#"{"title":"x"}"#).unwrap()["title"], "x");
        assert!(matches!(parse_body(b"[1,2]"), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_body(b"{not json"), Err(ApiError::BadRequest(_))));
    }
}
