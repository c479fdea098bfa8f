// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Health check types for the portal session pool

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health status of the lookup service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[allow(missing_docs)]
pub enum HealthStatus {
    /// Fast path has at least one ready session
    Up,
    /// Fast path unavailable, lookups are served by the public fallback
    Degraded { reason: String },
    /// Service is shutting down or closed
    Down { reason: String },
}

impl HealthStatus {
    /// Derive a status from session counts
    pub fn for_sessions(ready: usize, total: usize, closed: bool) -> Self {
        if closed {
            Self::Down {
                reason: "session pool is closed".to_string(),
            }
        } else if ready > 0 {
            Self::Up
        } else if total == 0 {
            Self::Degraded {
                reason: "no portal sessions, serving from public registries".to_string(),
            }
        } else {
            Self::Degraded {
                reason: format!("0 of {total} portal sessions ready, serving from public registries"),
            }
        }
    }

    /// Check if this health status indicates the service is available
    pub fn is_available(&self) -> bool {
        matches!(self, HealthStatus::Up | HealthStatus::Degraded { .. })
    }

    /// Check if this health status indicates the service is completely down
    pub fn is_down(&self) -> bool {
        matches!(self, HealthStatus::Down { .. })
    }

    /// Get a human-readable description of the status
    pub fn description(&self) -> &str {
        match self {
            HealthStatus::Up => "Service is healthy",
            HealthStatus::Degraded { reason } | HealthStatus::Down { reason } => reason,
        }
    }
}
