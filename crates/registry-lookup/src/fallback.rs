// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Slow-path lookups against public, unauthenticated sources
//!
//! Routing is purely by identifier kind: short-form numbers go to the public
//! civil-registry mirror, long-form numbers to the public tax-registry API. Each
//! method runs under a hard wall-clock budget.

mod civil_registry;
mod tax_registry;

use std::time::Duration;

use reqwest::Client;
use shared_types::{FailureReason, IdentityKind, IdentityNumber, Record};
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

pub use tax_registry::{Establishment, TaxpayerEntry, head_office_address};

const USER_AGENT: &str = concat!("registry-lookup/", env!("CARGO_PKG_VERSION"));

/// Default public civil-registry mirror
pub const DEFAULT_CIVIL_REGISTRY_URL: &str =
    "https://www.ecuadorlegalonline.com/modulo/consultar-cedula.php";
/// Default consolidated taxpayer endpoint
pub const DEFAULT_TAX_REGISTRY_URL: &str = "https://srienlinea.sri.gob.ec/sri-catastro-sujeto-servicio-internet/rest/ConsolidadoContribuyente/obtenerPorNumerosRuc";
/// Default establishments endpoint
pub const DEFAULT_ESTABLISHMENTS_URL: &str = "https://srienlinea.sri.gob.ec/sri-catastro-sujeto-servicio-internet/rest/Establecimiento/consultarPorNumeroRuc";

/// Endpoints and budgets of the slow path
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Civil-registry mirror form endpoint
    pub civil_registry_url: Url,
    /// Consolidated taxpayer endpoint
    pub tax_registry_url: Url,
    /// Establishments endpoint used for address enrichment
    pub establishments_url: Url,
    /// Budget for one fallback method
    pub budget: Duration,
    /// Budget for the address enrichment inside the tax-registry method
    pub enrichment_budget: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            civil_registry_url: Url::parse(DEFAULT_CIVIL_REGISTRY_URL)
                .expect("default civil registry url is valid"),
            tax_registry_url: Url::parse(DEFAULT_TAX_REGISTRY_URL)
                .expect("default tax registry url is valid"),
            establishments_url: Url::parse(DEFAULT_ESTABLISHMENTS_URL)
                .expect("default establishments url is valid"),
            budget: Duration::from_secs(3),
            enrichment_budget: Duration::from_secs(2),
        }
    }
}

/// Errors of the slow path
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum FallbackError {
    /// Source has no record for the identifier
    #[error("No record in the public registry")]
    NotFound,

    /// Taxpayer is suspended or cancelled
    #[error("Taxpayer is inactive: {0}")]
    Inactive(String),

    /// Source did not answer within the budget
    #[error("Public registry timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Source answered with an error status or unusable body
    #[error("Public registry error: {status} - {message}")]
    Upstream { status: u16, message: String },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl FallbackError {
    /// Classified reason
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::NotFound => FailureReason::NotFound,
            Self::Inactive(_) => FailureReason::Inactive,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::Upstream { .. } | Self::Http(_) => FailureReason::UpstreamError,
        }
    }
}

/// Resolver for the public slow-path sources
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    client: Client,
    config: FallbackConfig,
}

impl FallbackResolver {
    /// Create a new fallback resolver
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(config: FallbackConfig) -> Result<Self, FallbackError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(FallbackError::Http)?;
        Ok(Self { client, config })
    }

    /// Resolver configuration
    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Resolve an identifier through the source matching its kind
    ///
    /// [`IdentityNumber`] only exists for supported lengths, so every call reaches
    /// exactly one source.
    pub async fn resolve(&self, identifier: &IdentityNumber) -> Result<Record, FallbackError> {
        let budget = self.config.budget;
        let lookup = async {
            match identifier.kind() {
                IdentityKind::Short => {
                    civil_registry::lookup(&self.client, &self.config.civil_registry_url, identifier)
                        .await
                }
                IdentityKind::Long => {
                    tax_registry::lookup(&self.client, &self.config, identifier).await
                }
            }
        };

        match timeout(budget, lookup).await {
            Ok(result) => result,
            Err(_) => {
                debug!(identifier = %identifier.masked(), "Public registry timed out");
                Err(FallbackError::Timeout {
                    timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}
