use async_trait::async_trait;
use paygate_core::AppResult;
use paygate_domain::{Credential, CredentialLookup};

/// Port to the upstream authentication service.
#[async_trait]
pub trait CredentialAuthority: Send + Sync {
    /// Resolves one credential.
    ///
    /// A credential the upstream does not recognise is `Ok(CredentialLookup::Invalid)`.
    /// Transport failures and server errors are `Err(AppError::Unavailable)`.
    async fn lookup(&self, credential: &Credential) -> AppResult<CredentialLookup>;
}
