// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt::Debug;
use std::sync::Arc;
use std::{future::Future, pin::Pin};
use tokio::sync::OnceCell;

/// Symmetric key material used to sign outbound requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Reads the credentials the platform injects into the execution environment.
    pub fn from_env() -> Option<Self> {
        let access_key_id = env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        let session_token = env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        Some(Self::new(access_key_id, secret_access_key, session_token))
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("session_token", &self.session_token.is_some())
            .finish_non_exhaustive()
    }
}

pub type CredentialsFuture = Pin<Box<dyn Future<Output = Option<Credentials>> + Send>>;

pub type CredentialsResolverFn = Arc<dyn Fn() -> CredentialsFuture + Send + Sync>;

#[derive(Clone)]
pub enum CredentialsFactory {
    Static(Credentials),
    Dynamic {
        resolver_fn: CredentialsResolverFn,
        credentials: Arc<OnceCell<Option<Credentials>>>,
    },
}

impl CredentialsFactory {
    pub fn new_from_resolver(resolver_fn: CredentialsResolverFn) -> Self {
        Self::Dynamic {
            resolver_fn,
            credentials: Arc::new(OnceCell::new()),
        }
    }

    pub fn new_from_static(credentials: Credentials) -> Self {
        Self::Static(credentials)
    }

    /// Environment-backed factory; the lookup is deferred until the first signature.
    pub fn from_env() -> Self {
        Self::new_from_resolver(Arc::new(|| -> CredentialsFuture {
            Box::pin(async { Credentials::from_env() })
        }))
    }

    pub async fn get_credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Static(credentials) => Some(credentials),
            Self::Dynamic {
                resolver_fn,
                credentials,
            } => credentials
                .get_or_init(|| async { (resolver_fn)().await })
                .await
                .as_ref(),
        }
    }
}

impl Debug for CredentialsFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialsFactory")
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock_credentials() -> Credentials {
        Credentials::new("AKIDEXAMPLE", "mock-secret", None)
    }

    #[tokio::test]
    async fn new_from_resolver() {
        let factory = CredentialsFactory::new_from_resolver(Arc::new(move || -> CredentialsFuture {
            Box::pin(async move { Some(mock_credentials()) })
        }));
        let credentials = factory.get_credentials().await.unwrap();
        assert_eq!(credentials.access_key_id, "AKIDEXAMPLE");
    }

    #[tokio::test]
    async fn resolver_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = CredentialsFactory::new_from_resolver(Arc::new(move || -> CredentialsFuture {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Some(mock_credentials()) })
        }));

        factory.get_credentials().await;
        factory.get_credentials().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_from_static() {
        let factory = CredentialsFactory::new_from_static(mock_credentials());
        assert_eq!(factory.get_credentials().await, Some(&mock_credentials()));
    }

    #[tokio::test]
    async fn resolver_without_credentials() {
        let factory = CredentialsFactory::new_from_resolver(Arc::new(|| -> CredentialsFuture {
            Box::pin(async { None })
        }));
        assert!(factory.get_credentials().await.is_none());
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", mock_credentials());
        assert!(rendered.contains("AKIDEXAMPLE"));
        assert!(!rendered.contains("mock-secret"));
    }
}
