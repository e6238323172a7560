//! Wrapper for collaborators whose failures must never surface.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Runs calls against `inner`, logging failures at `warn` and turning them
/// into `None`.
pub struct BestEffort<T: ?Sized> {
    name: &'static str,
    inner: Arc<T>,
}

impl<T: ?Sized> BestEffort<T> {
    pub fn new(name: &'static str, inner: Arc<T>) -> Self {
        Self { name, inner }
    }

    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }

    pub async fn call<'a, R, E, Fut>(&'a self, operation: &str, f: impl FnOnce(&'a T) -> Fut) -> Option<R>
    where
        Fut: Future<Output = Result<R, E>> + 'a,
        E: Display,
    {
        match f(self.inner.as_ref()).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(collaborator = self.name, operation, error = %e, "best-effort call failed");
                None
            }
        }
    }
}

impl<T: ?Sized> Clone for BestEffort<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky {
        fail: bool,
    }

    impl Flaky {
        async fn answer(&self) -> Result<u32, String> {
            if self.fail {
                Err("boom".to_string())
            } else {
                Ok(42)
            }
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let wrapped = BestEffort::new("flaky", Arc::new(Flaky { fail: false }));
        assert_eq!(wrapped.call("answer", |f| f.answer()).await, Some(42));
    }

    #[tokio::test]
    async fn test_failure_is_absorbed() {
        let wrapped = BestEffort::new("flaky", Arc::new(Flaky { fail: true }));
        assert_eq!(wrapped.call("answer", |f| f.answer()).await, None);
    }
}
