//! Health probe types for storage backends.
//!
//! The service refuses to subscribe to any bus subject until the reservation
//! store answers a [`HealthProbe::Liveness`] probe. Backends report the result
//! as a [`HealthStatus`] carrying [`HealthMetadata`] (timing and backend name),
//! so the startup log line can say how long the store took to answer.

use std::{collections::BTreeMap, fmt, time::Duration};

/// The kind of health probe to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthProbe {
    /// The store is reachable and answering requests.
    Liveness,
    /// The store can serve reservation traffic.
    Readiness,
}

impl fmt::Display for HealthProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Liveness => write!(f, "liveness"),
            Self::Readiness => write!(f, "readiness"),
        }
    }
}

/// Result of a [`StorageBackend::health_check`](crate::StorageBackend::health_check).
#[derive(Debug, Clone)]
pub enum HealthStatus {
    /// Backend is fully operational.
    Healthy(HealthMetadata),
    /// Backend cannot serve traffic; the `String` carries the reason.
    Unhealthy(HealthMetadata, String),
}

impl HealthStatus {
    /// Creates a `Healthy` status.
    #[must_use = "creating a status has no side effects"]
    pub fn healthy(metadata: HealthMetadata) -> Self {
        Self::Healthy(metadata)
    }

    /// Creates an `Unhealthy` status with a reason.
    #[must_use = "creating a status has no side effects"]
    pub fn unhealthy(metadata: HealthMetadata, reason: impl Into<String>) -> Self {
        Self::Unhealthy(metadata, reason.into())
    }

    /// Returns `true` if the backend is healthy.
    #[must_use = "health status predicates should be checked"]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }

    /// Returns the metadata associated with this status.
    #[must_use]
    pub fn metadata(&self) -> &HealthMetadata {
        match self {
            Self::Healthy(m) | Self::Unhealthy(m, _) => m,
        }
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Healthy(_) => None,
            Self::Unhealthy(_, reason) => Some(reason),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy(m) => {
                write!(f, "{} healthy ({}ms)", m.backend, m.check_duration.as_millis())
            },
            Self::Unhealthy(m, reason) => write!(
                f,
                "{} unhealthy: {} ({}ms)",
                m.backend,
                reason,
                m.check_duration.as_millis()
            ),
        }
    }
}

/// Timing and identification attached to a [`HealthStatus`].
#[derive(Debug, Clone)]
pub struct HealthMetadata {
    /// How long the probe took.
    pub check_duration: Duration,
    /// Backend identifier ("memory", "redis").
    pub backend: String,
    /// Backend-specific details, e.g. the number of held reservations.
    pub details: BTreeMap<String, String>,
}

impl HealthMetadata {
    /// Creates metadata for a probe that took `check_duration` on `backend`.
    #[must_use]
    pub fn new(check_duration: Duration, backend: impl Into<String>) -> Self {
        Self { check_duration, backend: backend.into(), details: BTreeMap::new() }
    }

    /// Adds a detail entry, returning `self` for chaining.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
