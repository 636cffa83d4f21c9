use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// One way of reaching the provider: a credential plus an optional egress
/// route (proxy URL). Routes add network hops, so callers give routed
/// attempts a longer timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderChannel {
    pub credential: String,
    pub route: Option<String>,
}

impl ProviderChannel {
    pub fn is_routed(&self) -> bool {
        self.route.is_some()
    }
}

/// Sticky rotation over (credential, egress-route) pairs.
///
/// The current indices persist for the lifetime of the process and are
/// never reset on success: once traffic has shifted away from a degraded
/// route it stays shifted instead of thrashing back. Concurrent callers
/// share the same state on purpose; a rotation performed by one in-flight
/// call is visible to all others.
pub struct ChannelRotator {
    credentials: Vec<String>,
    routes: Vec<String>,
    credential_index: AtomicUsize,
    route_index: AtomicUsize,
}

impl ChannelRotator {
    pub fn new(credentials: Vec<String>, routes: Vec<String>) -> Self {
        assert!(!credentials.is_empty(), "at least one credential required");
        info!(
            credentials = credentials.len(),
            routes = routes.len(),
            "provider channel rotator initialized"
        );
        Self {
            credentials,
            routes,
            credential_index: AtomicUsize::new(0),
            route_index: AtomicUsize::new(0),
        }
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn current(&self) -> ProviderChannel {
        let credential =
            self.credentials[self.credential_index.load(Ordering::Relaxed) % self.credentials.len()]
                .clone();
        let route = if self.routes.is_empty() {
            None
        } else {
            Some(self.routes[self.route_index.load(Ordering::Relaxed) % self.routes.len()].clone())
        };
        ProviderChannel { credential, route }
    }

    /// Advance to the next egress route. Returns false when there is
    /// nothing to rotate to.
    pub fn rotate_route(&self) -> bool {
        if self.routes.len() < 2 {
            return false;
        }
        let next = (self.route_index.load(Ordering::Relaxed) + 1) % self.routes.len();
        self.route_index.store(next, Ordering::Relaxed);
        info!(route = next, "rotated provider egress route");
        true
    }

    /// Advance to the next credential, rotating the route along with it so
    /// the retry exercises a genuinely different pair.
    pub fn rotate_credential(&self) -> bool {
        if self.credentials.len() < 2 {
            return false;
        }
        let next = (self.credential_index.load(Ordering::Relaxed) + 1) % self.credentials.len();
        self.credential_index.store(next, Ordering::Relaxed);
        if self.routes.len() > 1 {
            let route = (self.route_index.load(Ordering::Relaxed) + 1) % self.routes.len();
            self.route_index.store(route, Ordering::Relaxed);
        }
        info!(credential = next, "rotated provider credential");
        true
    }

    /// The last-selected credential with no egress route, for the final
    /// direct attempt after all rotations are exhausted.
    pub fn direct(&self) -> ProviderChannel {
        ProviderChannel {
            credential: self.credentials
                [self.credential_index.load(Ordering::Relaxed) % self.credentials.len()]
            .clone(),
            route: None,
        }
    }
}
