//! Probe-once service health registry.
//!
//! Built from the probe records produced at collaborator selection and
//! never mutated afterwards. A collaborator that fails mid-run degrades
//! that run only; the registry keeps reporting the construction-time
//! picture.

use std::collections::BTreeMap;

use serde::Serialize;

use chime_services::selection::ServiceProbe;
use chime_services::types::ServiceVariant;

/// Immutable health registry for the five collaborators.
#[derive(Clone, Debug)]
pub struct ServiceHealthRegistry {
    probes: Vec<ServiceProbe>,
}

/// Per-service entry in the status report.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceStatusEntry {
    /// `healthy` or `degraded`.
    pub status: &'static str,
    /// Which implementation is serving: `real` or `mock`.
    pub service_type: &'static str,
    /// Probe failure description, present when degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregate service status, the `get_service_status` payload.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceStatusReport {
    /// Total collaborators probed.
    pub total_services: usize,
    /// Collaborators whose probe succeeded.
    pub healthy_services: usize,
    /// Collaborators running on their mock variant.
    pub degraded_services: usize,
    /// `production` when everything is healthy, `degraded` otherwise.
    pub pipeline_mode: &'static str,
    /// Per-service detail, keyed by canonical service name.
    pub service_status: BTreeMap<String, ServiceStatusEntry>,
}

impl ServiceHealthRegistry {
    /// Build the registry from construction-time probe records.
    #[must_use]
    pub fn from_probes(probes: Vec<ServiceProbe>) -> Self {
        Self { probes }
    }

    /// Whether the named service probed healthy.
    #[must_use]
    pub fn is_healthy(&self, name: &str) -> bool {
        self.probes.iter().any(|p| p.name == name && p.healthy)
    }

    /// Number of services probed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.probes.len()
    }

    /// Number of healthy services.
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.probes.iter().filter(|p| p.healthy).count()
    }

    /// Number of degraded services.
    #[must_use]
    pub fn degraded_count(&self) -> usize {
        self.total() - self.healthy_count()
    }

    /// Names of degraded services, in probe order.
    #[must_use]
    pub fn degraded_names(&self) -> Vec<String> {
        self.probes
            .iter()
            .filter(|p| !p.healthy)
            .map(|p| p.name.to_string())
            .collect()
    }

    /// The variant serving the named service.
    #[must_use]
    pub fn variant_of(&self, name: &str) -> ServiceVariant {
        if self.is_healthy(name) {
            ServiceVariant::Real
        } else {
            ServiceVariant::Mock
        }
    }

    /// Build the aggregate status report.
    #[must_use]
    pub fn report(&self) -> ServiceStatusReport {
        let mut service_status = BTreeMap::new();
        for probe in &self.probes {
            let _ = service_status.insert(
                probe.name.to_string(),
                ServiceStatusEntry {
                    status: if probe.healthy { "healthy" } else { "degraded" },
                    service_type: self.variant_of(probe.name).as_str(),
                    reason: probe.reason.clone(),
                },
            );
        }
        ServiceStatusReport {
            total_services: self.total(),
            healthy_services: self.healthy_count(),
            degraded_services: self.degraded_count(),
            pipeline_mode: if self.degraded_count() == 0 {
                "production"
            } else {
                "degraded"
            },
            service_status,
        }
    }
}
