// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Public civil-registry mirror, short-form numbers

use reqwest::Client;
use shared_types::{IdentityNumber, Record};
use tracing::{debug, warn};
use url::Url;

use super::FallbackError;
use crate::parse::parse_civil_registry_response;

pub(super) async fn lookup(
    client: &Client,
    url: &Url,
    identifier: &IdentityNumber,
) -> Result<Record, FallbackError> {
    debug!(identifier = %identifier.masked(), "Querying civil registry mirror");

    let response = client
        .post(url.clone())
        .form(&[("name", identifier.as_str()), ("tipo", "I")])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!(status = status.as_u16(), "Civil registry mirror error");
        return Err(FallbackError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.text().await?;
    parse_civil_registry_response(&body, identifier).ok_or(FallbackError::NotFound)
}
