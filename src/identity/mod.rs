//! Maps a caller (linking-session token and/or email) to the durable
//! identity key that cumulative scores are stored under.

use chrono::{Duration, Utc};

use crate::{
    db::{
        models::{AuthSession, SessionBinding, User},
        Database,
    },
    errors::TrackingError,
};

const USER_KEY_PREFIX: &str = "user:";
const EMAIL_KEY_PREFIX: &str = "email:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// `user:<id>` or `email:<lowercased email>`.
    pub key: String,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct IdentityResolver {
    db: Database,
    session_lifetime: Duration,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl IdentityResolver {
    pub fn new(db: Database, session_lifetime: Duration) -> Self {
        Self {
            db,
            session_lifetime,
        }
    }

    /// Issues a linking-session token, bound to `user_id` when given.
    pub async fn open_session(&self, user_id: Option<i64>) -> Result<AuthSession, TrackingError> {
        Ok(self
            .db
            .create_auth_session(user_id, self.session_lifetime)
            .await?)
    }

    /// The user behind `token`, if the token exists, has not expired and is
    /// bound to a user that still exists.
    pub async fn authenticated_user(
        &self,
        token: Option<&str>,
    ) -> Result<Option<User>, TrackingError> {
        let Some(token) = non_blank(token) else {
            return Ok(None);
        };
        let Some(session) = self.db.get_auth_session(token).await? else {
            return Ok(None);
        };
        if session.is_expired(Utc::now()) {
            return Ok(None);
        }
        match session.user_id {
            Some(user_id) => Ok(self.db.get_user_by_id(user_id).await?),
            None => Ok(None),
        }
    }

    /// Ownership facts recorded on page sessions written by this caller.
    pub async fn binding(&self, token: Option<&str>) -> Result<SessionBinding, TrackingError> {
        let user = self.authenticated_user(token).await?;
        Ok(SessionBinding {
            user_session_id: non_blank(token).map(str::to_string),
            user_id: user.map(|user| user.id),
        })
    }

    /// Resolves the identity for cumulative scoring. An authenticated user
    /// wins over a bare email; with neither the caller is unauthorized.
    pub async fn resolve(
        &self,
        token: Option<&str>,
        email: Option<&str>,
    ) -> Result<ResolvedIdentity, TrackingError> {
        let email = non_blank(email);

        if let Some(user) = self.authenticated_user(token).await? {
            return Ok(ResolvedIdentity {
                key: format!("{USER_KEY_PREFIX}{}", user.id),
                email: Some(email.map(str::to_string).unwrap_or(user.email)),
            });
        }

        match email {
            Some(email) => Ok(ResolvedIdentity {
                key: format!("{EMAIL_KEY_PREFIX}{}", email.to_lowercase()),
                email: Some(email.to_string()),
            }),
            None => Err(TrackingError::Unauthorized(
                "a signed-in session or an email is required".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use tempfile::TempDir;

    use super::*;
    use crate::errors::ErrorKind;

    fn resolver() -> (TempDir, IdentityResolver) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("identity.sqlite3"), StdDuration::from_secs(5))
            .unwrap();
        (dir, IdentityResolver::new(db, Duration::days(7)))
    }

    #[tokio::test]
    async fn signed_in_user_resolves_to_user_key() {
        let (_dir, resolver) = resolver();
        let user = resolver
            .db
            .insert_user("Ada".into(), "ada@example.com".into())
            .await
            .unwrap();
        let session = resolver.open_session(Some(user.id)).await.unwrap();
        assert!(session.expires_at.is_some());

        let identity = resolver.resolve(Some(&session.id), None).await.unwrap();
        assert_eq!(identity.key, format!("user:{}", user.id));
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));

        let explicit = resolver
            .resolve(Some(&session.id), Some("other@example.com"))
            .await
            .unwrap();
        assert_eq!(explicit.key, format!("user:{}", user.id));
        assert_eq!(explicit.email.as_deref(), Some("other@example.com"));
    }

    #[tokio::test]
    async fn email_fallback_is_lowercased() {
        let (_dir, resolver) = resolver();
        let anonymous = resolver.open_session(None).await.unwrap();
        assert!(anonymous.expires_at.is_none());

        let identity = resolver
            .resolve(Some(&anonymous.id), Some("  Bob@Example.COM "))
            .await
            .unwrap();
        assert_eq!(identity.key, "email:bob@example.com");
    }

    #[tokio::test]
    async fn expired_session_counts_as_anonymous() {
        let (_dir, resolver) = resolver();
        let user = resolver
            .db
            .insert_user("Cy".into(), "cy@example.com".into())
            .await
            .unwrap();
        let expired = resolver
            .db
            .create_auth_session(Some(user.id), Duration::seconds(-60))
            .await
            .unwrap();

        assert!(resolver
            .authenticated_user(Some(&expired.id))
            .await
            .unwrap()
            .is_none());
        let err = resolver.resolve(Some(&expired.id), Some("   ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn binding_carries_token_and_user() {
        let (_dir, resolver) = resolver();
        let user = resolver
            .db
            .insert_user("Di".into(), "di@example.com".into())
            .await
            .unwrap();
        let session = resolver.open_session(Some(user.id)).await.unwrap();

        let bound = resolver.binding(Some(&session.id)).await.unwrap();
        assert_eq!(bound.user_session_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(bound.user_id, Some(user.id));

        let unknown = resolver.binding(Some("no-such-token")).await.unwrap();
        assert_eq!(unknown.user_session_id.as_deref(), Some("no-such-token"));
        assert_eq!(unknown.user_id, None);
    }
}
