// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Public tax-registry API, long-form numbers

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use shared_types::{FallbackSource, IdentityNumber, Record, SourceMethod, TaxpayerDetails};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use super::{FallbackConfig, FallbackError};

const SUSPENDED: &str = "SUSPENDIDO";
const OPEN: &str = "ABIERTO";
const YES: &str = "SI";

/// One entry of the consolidated taxpayer response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaxpayerEntry {
    /// Registered legal name
    pub razon_social: Option<String>,
    /// Registry status, e.g. `ACTIVO` or `SUSPENDIDO`
    pub estado_contribuyente_ruc: Option<String>,
    /// Reason for cancellation or suspension, if any
    pub motivo_cancelacion_suspension: Option<String>,
    /// Main economic activity
    pub actividad_economica_principal: Option<String>,
    /// Taxpayer type
    pub tipo_contribuyente: Option<String>,
    /// Tax regime
    pub regimen: Option<String>,
    /// `SI` when formal accounts are required
    pub obligado_llevar_contabilidad: Option<String>,
    /// `SI` when the taxpayer is a withholding agent
    pub agente_retencion: Option<String>,
}

/// One establishment of a taxpayer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Establishment {
    /// Full street address
    pub direccion_completa: Option<String>,
    /// `ABIERTO` when operating
    pub estado: Option<String>,
    /// `SI` for the head office
    pub matriz: Option<String>,
}

impl TaxpayerEntry {
    /// Convert the first registry entry into a record
    ///
    /// Suspended or cancelled taxpayers are reported as inactive rather than as
    /// records.
    pub fn into_record(self, identifier: &IdentityNumber) -> Result<Record, FallbackError> {
        let legal_name = non_blank(self.razon_social).ok_or(FallbackError::NotFound)?;

        if self
            .estado_contribuyente_ruc
            .as_deref()
            .is_some_and(|status| status.trim().eq_ignore_ascii_case(SUSPENDED))
        {
            return Err(FallbackError::Inactive("suspended".to_string()));
        }
        if let Some(reason) = non_blank(self.motivo_cancelacion_suspension) {
            return Err(FallbackError::Inactive(reason));
        }

        let details = TaxpayerDetails {
            economic_activity: self.actividad_economica_principal.unwrap_or_default(),
            taxpayer_type: self.tipo_contribuyente.unwrap_or_default(),
            regime: self.regimen.unwrap_or_default(),
            keeps_accounting: is_yes(self.obligado_llevar_contabilidad.as_deref()),
            withholding_agent: is_yes(self.agente_retencion.as_deref()),
        };

        Ok(Record::new(
            identifier.clone(),
            legal_name,
            SourceMethod::Fallback(FallbackSource::TaxRegistry),
        )
        .with_details(details))
    }
}

/// Address of the open head office, if the registry lists one
pub fn head_office_address(establishments: &[Establishment]) -> Option<String> {
    establishments
        .iter()
        .find(|e| is_open(e.estado.as_deref()) && is_yes(e.matriz.as_deref()))
        .and_then(|e| non_blank(e.direccion_completa.clone()))
}

pub(super) async fn lookup(
    client: &Client,
    config: &FallbackConfig,
    identifier: &IdentityNumber,
) -> Result<Record, FallbackError> {
    debug!(identifier = %identifier.masked(), "Querying tax registry");

    let response = client
        .get(config.tax_registry_url.clone())
        .query(&[("ruc", identifier.as_str())])
        .header("accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Err(FallbackError::NotFound);
    }
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!(status = status.as_u16(), "Tax registry error");
        return Err(FallbackError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.text().await?;
    if body.trim().is_empty() {
        return Err(FallbackError::NotFound);
    }
    let entries: Vec<TaxpayerEntry> =
        serde_json::from_str(&body).map_err(|e| FallbackError::Upstream {
            status: status.as_u16(),
            message: format!("unexpected taxpayer response: {e}"),
        })?;

    let entry = entries.into_iter().next().ok_or(FallbackError::NotFound)?;
    let record = entry.into_record(identifier)?;

    let address = match timeout(
        config.enrichment_budget,
        fetch_head_office_address(client, &config.establishments_url, identifier),
    )
    .await
    {
        Ok(Ok(address)) => address.unwrap_or_default(),
        Ok(Err(e)) => {
            debug!(error = %e, "Establishment lookup failed, leaving address empty");
            String::new()
        }
        Err(_) => {
            debug!("Establishment lookup timed out, leaving address empty");
            String::new()
        }
    };

    Ok(record.with_address(address))
}

async fn fetch_head_office_address(
    client: &Client,
    url: &Url,
    identifier: &IdentityNumber,
) -> Result<Option<String>, FallbackError> {
    let response = client
        .get(url.clone())
        .query(&[("numeroRuc", identifier.as_str())])
        .header("accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(FallbackError::Upstream {
            status: status.as_u16(),
            message: "establishments unavailable".to_string(),
        });
    }

    let establishments: Vec<Establishment> = response.json().await?;
    Ok(head_office_address(&establishments))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_yes(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case(YES))
}

fn is_open(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case(OPEN))
}
