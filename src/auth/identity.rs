//! Maps bearer credentials to local users.
//!
//! `identity_layer` runs on every user-facing route and stores a [`Caller`]
//! in the request extensions. Handlers pick it up through the [`Caller`] or
//! [`CurrentUser`] extractors and pass the user explicitly to domain code.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use super::jwks::{JwksVerifier, VerifiedToken};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{NewUser, RegisterRequest, Role, User};

/// Who is calling.
#[derive(Debug, Clone)]
pub enum Caller {
    /// No credential was presented
    Anonymous,
    /// Valid credential, no local account yet
    Unregistered(VerifiedToken),
    Registered(User),
}

pub struct IdentityResolver {
    verifier: JwksVerifier,
    repo: Arc<Repository>,
}

impl IdentityResolver {
    pub fn new(verifier: JwksVerifier, repo: Arc<Repository>) -> Self {
        Self { verifier, repo }
    }

    /// Resolve the value of an `Authorization` header.
    pub async fn resolve(&self, authorization: Option<&str>) -> Result<Caller, AppError> {
        let Some(value) = authorization else {
            return Ok(Caller::Anonymous);
        };

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                tracing::debug!("authorization header is not a bearer token");
                AppError::Unauthorized("Malformed authorization header".to_string())
            })?;

        let verified = self.verifier.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            AppError::Unauthorized(e.to_string())
        })?;

        match self.repo.find_user_by_clerk_id(&verified.subject).await? {
            Some(mut user) => {
                if let Some(email) = verified.email.as_deref() {
                    if email != user.email && self.repo.update_user_email(&user.id, email).await? {
                        tracing::info!(user_id = %user.id, "refreshed email from identity provider");
                        user.email = email.to_string();
                    }
                }
                Ok(Caller::Registered(user))
            }
            None => Ok(Caller::Unregistered(verified)),
        }
    }

    /// Create the local account for a verified caller.
    ///
    /// Returns the user and whether it was created by this call. Calling it
    /// again once registered returns the existing account untouched.
    pub async fn register(
        &self,
        caller: &Caller,
        body: &RegisterRequest,
    ) -> Result<(User, bool), AppError> {
        let token = match caller {
            Caller::Anonymous => {
                return Err(AppError::Unauthorized(
                    "Authentication required".to_string(),
                ))
            }
            Caller::Registered(user) => return Ok((user.clone(), false)),
            Caller::Unregistered(token) => token,
        };

        // The token's role claim is never trusted for account creation
        let role = match body.role.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(AppError::invalid_field(
                    "role",
                    "Role is required: player or organizer",
                ))
            }
            Some(raw) => Role::parse(&raw.to_lowercase()).ok_or_else(|| {
                AppError::invalid_field(
                    "role",
                    format!("Invalid role {:?}: expected player or organizer", raw),
                )
            })?,
        };

        if let Some(claimed) = token.role.as_deref() {
            if claimed != role.as_str() {
                tracing::debug!(claimed, chosen = role.as_str(), "ignoring role claim from token");
            }
        }

        let email = usable_email(token.email.as_deref())
            .or_else(|| usable_email(body.email.as_deref()))
            .ok_or_else(|| AppError::invalid_field("email", "A valid email is required"))?;

        let full_name = body
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| token.name.clone())
            .unwrap_or_else(|| email.clone());

        let (user, created) = self
            .repo
            .create_user(&NewUser {
                clerk_id: token.subject.clone(),
                email,
                full_name,
                role,
            })
            .await?;

        if created {
            tracing::info!(user_id = %user.id, role = user.role.as_str(), "user registered");
        } else {
            tracing::debug!(user_id = %user.id, "registration raced an existing account");
        }
        Ok((user, created))
    }
}

fn usable_email(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|e| e.contains('@'))
        .map(str::to_string)
}

/// Middleware resolving the caller of every request it wraps.
pub async fn identity_layer(
    State(identity): State<Arc<IdentityResolver>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default().to_string());

    let caller = identity.resolve(authorization.as_deref()).await?;
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Caller>()
            .cloned()
            .unwrap_or(Caller::Anonymous))
    }
}

/// A caller with a local account; rejects everyone else.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = parts.extensions.get::<Caller>().cloned();
        match caller.unwrap_or(Caller::Anonymous) {
            Caller::Registered(user) => Ok(CurrentUser(user)),
            Caller::Unregistered(_) => Err(AppError::NotRegistered),
            Caller::Anonymous => Err(AppError::Unauthorized(
                "Authentication required".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_email() {
        assert_eq!(usable_email(Some(" a@b.test ")).as_deref(), Some("a@b.test"));
        assert_eq!(usable_email(Some("user_123")), None);
        assert_eq!(usable_email(Some("")), None);
        assert_eq!(usable_email(None), None);
    }
}
