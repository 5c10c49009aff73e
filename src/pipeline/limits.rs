//! Per-provider concurrency limits.
//!
//! Each provider name gets its own semaphore, so a slow local model does
//! not hold back calls to a remote API used by another stage.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Lazily created semaphore per provider name.
#[derive(Debug)]
pub struct ProviderLimits {
    default_permits: usize,
    configured: HashMap<String, usize>,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ProviderLimits {
    /// `configured` overrides `default_permits` for named providers.
    pub fn new(default_permits: usize, configured: HashMap<String, usize>) -> Self {
        Self {
            default_permits: default_permits.max(1),
            configured,
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    /// Semaphore for `provider`, created on first use.
    pub fn semaphore(&self, provider: &str) -> Arc<Semaphore> {
        let mut semaphores = self.semaphores.lock();
        semaphores
            .entry(provider.to_string())
            .or_insert_with(|| {
                let permits = self
                    .configured
                    .get(provider)
                    .copied()
                    .unwrap_or(self.default_permits)
                    .max(1);
                Arc::new(Semaphore::new(permits))
            })
            .clone()
    }
}
