//! Host-facing persistence interface.
//!
//! The host framework talks to storage through a generic key-value contract.
//! The plugin persistor models a single logical record behind it, so keys are
//! mostly ignored (see [`crate::state::PluginPersistor`]).

use crate::error::PersistorError;
use std::future::Future;

/// The single key reported by [`PersistenceBackend::list_keys`].
pub const LOAD_ORDER_KEY: &str = "loadOrder";

/// Generic key-value persistence contract the host framework drives.
pub trait PersistenceBackend: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<String, PersistorError>> + Send;

    fn set(&self, key: &str, value: &str)
    -> impl Future<Output = Result<(), PersistorError>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), PersistorError>> + Send;

    fn list_keys(&self) -> impl Future<Output = Result<Vec<String>, PersistorError>> + Send;
}

/// Completion callback receiving the same result the future resolves to.
pub type Completion<T> = Box<dyn FnOnce(&Result<T, PersistorError>) + Send>;

/// Drive a backend call and notify an optional completion callback.
///
/// The callback runs exactly once, before the result is handed back, so
/// callback-style and await-style callers always observe the same outcome.
///
/// ```ignore
/// let json = with_completion(persistor.get(LOAD_ORDER_KEY), Some(Box::new(|res| {
///     tracing::debug!("get finished: ok={}", res.is_ok());
/// }))).await?;
/// ```
pub async fn with_completion<T, F>(
    operation: F,
    callback: Option<Completion<T>>,
) -> Result<T, PersistorError>
where
    F: Future<Output = Result<T, PersistorError>>,
{
    let result = operation.await;
    if let Some(callback) = callback {
        callback(&result);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callback_invoked_once_on_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let result = tokio_test::block_on(with_completion(
            async { Ok::<_, PersistorError>(7) },
            Some(Box::new(move |res: &Result<i32, PersistorError>| {
                assert_eq!(res.as_ref().ok(), Some(&7));
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        ));

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_sees_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let result = tokio_test::block_on(with_completion(
            async { serde_json::from_str::<u32>("not json").map_err(PersistorError::from) },
            Some(Box::new(move |res: &Result<u32, PersistorError>| {
                assert!(matches!(res, Err(PersistorError::InvalidJson(_))));
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        ));

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_callback() {
        let result = tokio_test::block_on(with_completion(
            async { Ok::<_, PersistorError>("value".to_string()) },
            None,
        ));
        assert_eq!(result.unwrap(), "value");
    }
}
