//! Registration precondition for uploads

use std::sync::Arc;

use crate::store::BucketStore;

/// Asks the bucket whether the current caller may upload
#[derive(Clone)]
pub struct RegistrationGate {
    store: Arc<dyn BucketStore>,
}

impl RegistrationGate {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    /// Single query, no retry. A failed query counts as "not registered".
    pub async fn is_registered(&self) -> bool {
        match self.store.is_user_registered().await {
            Ok(registered) => registered,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Registration check failed, treating caller as unregistered"
                );
                false
            }
        }
    }
}
