//! Session verification and the actor model.
//!
//! Token issuance is the identity provider's job; this service only verifies
//! bearer tokens and turns their claims into an [`Actor`] carrying the role,
//! department and facility scope the permission engine works with.

pub mod permissions;

use std::str::FromStr;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

/// Roles recognized by the permission engine.
///
/// `Admin` and `Manager` are cross-department managerial roles; `Staff` is
/// scoped to its own department; `Auditor` is strictly view-only.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Auditor,
}

impl Role {
    pub fn is_managerial(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn is_view_only(self) -> bool {
        matches!(self, Role::Auditor)
    }
}

/// Which facilities an actor may see. `All` is typical for platform admins
/// and auditors; everyone else carries an explicit facility list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacilityScope {
    All,
    Facilities(Vec<i64>),
}

impl FacilityScope {
    pub fn allows(&self, facility_id: Option<i64>) -> bool {
        match self {
            FacilityScope::All => true,
            // Records without a facility stay invisible to scoped actors.
            FacilityScope::Facilities(ids) => {
                facility_id.map(|id| ids.contains(&id)).unwrap_or(false)
            }
        }
    }

    /// Wide scopes must pick a facility before unbounded views (the kanban
    /// board) are allowed to fetch.
    pub fn requires_facility_filter(&self) -> bool {
        match self {
            FacilityScope::All => true,
            FacilityScope::Facilities(ids) => ids.len() > 1,
        }
    }

    fn scope_key(&self) -> String {
        match self {
            FacilityScope::All => "all".to_string(),
            FacilityScope::Facilities(ids) => {
                let mut ids = ids.clone();
                ids.sort_unstable();
                format!(
                    "fac:{}",
                    ids.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",")
                )
            }
        }
    }
}

/// Session claims as minted by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub role: String,
    pub department_id: Option<i64>,
    /// Absent means unrestricted (all facilities).
    pub facility_ids: Option<Vec<i64>>,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated caller, as the permission engine sees it.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub department_id: Option<i64>,
    pub facility_scope: FacilityScope,
}

impl Actor {
    pub fn from_claims(claims: &Claims) -> Result<Self, ServiceError> {
        let role = Role::from_str(&claims.role)
            .map_err(|_| ServiceError::Unauthorized(format!("unknown role '{}'", claims.role)))?;
        let facility_scope = match &claims.facility_ids {
            None => FacilityScope::All,
            Some(ids) => FacilityScope::Facilities(ids.clone()),
        };
        Ok(Actor {
            user_id: claims.sub,
            role,
            department_id: claims.department_id,
            facility_scope,
        })
    }

    /// Cache-key fragment separating differently scoped actors, so tenant
    /// restriction never leaks through a shared cache entry.
    pub fn scope_key(&self) -> String {
        self.facility_scope.scope_key()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("authentication required".to_string()))
    }
}

/// Verifies bearer tokens against the configured secret.
#[derive(Clone)]
pub struct AuthVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| ServiceError::Unauthorized(format!("invalid session token: {}", err)))
    }
}

/// Session middleware: every transfer endpoint sits behind this. Rejected
/// calls return 401 with no data.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

    let claims = state.auth.verify(token)?;
    let actor = Actor::from_claims(&claims)?;
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}
