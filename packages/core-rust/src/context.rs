use serde::{Deserialize, Serialize};

/// Authenticated caller as seen by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable subject identifier (the `sub` claim of the caller's token).
    pub id: String,
    /// Roles assigned to this principal.
    pub roles: Vec<String>,
}

impl Principal {
    #[must_use]
    pub fn new(id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }
}

/// Accessor for the ambient authenticated principal.
///
/// Implemented by the application's security layer. Returning `None` is not an
/// error: the call goes out with an anonymous header.
pub trait PrincipalProvider: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;
}

/// Provider for system-internal callers that never carry an identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousPrincipal;

impl PrincipalProvider for AnonymousPrincipal {
    fn current_principal(&self) -> Option<Principal> {
        None
    }
}

/// Provider that always reports the same principal (service accounts, tests).
#[derive(Debug, Clone)]
pub struct StaticPrincipal(pub Principal);

impl PrincipalProvider for StaticPrincipal {
    fn current_principal(&self) -> Option<Principal> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_provider_has_no_principal() {
        assert!(AnonymousPrincipal.current_principal().is_none());
    }

    #[test]
    fn static_provider_returns_its_principal() {
        let provider = StaticPrincipal(Principal::new("sub-9", vec!["ADMIN".to_string()]));
        let principal = provider.current_principal().unwrap();
        assert_eq!(principal.id, "sub-9");
        assert_eq!(principal.roles, vec!["ADMIN"]);
    }
}
