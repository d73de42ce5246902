use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::info;

pub type ModelFactory<T> = Arc<dyn Fn() -> anyhow::Result<Arc<T>> + Send + Sync>;

/// A model loaded on first use and then shared read-only.
///
/// The factory runs on the blocking pool; concurrent first callers wait on
/// the same initialization. A failed load leaves the handle empty so a later
/// call retries.
pub struct LazyModel<T: ?Sized> {
    name: &'static str,
    cell: OnceCell<Arc<T>>,
    factory: ModelFactory<T>,
}

impl<T: ?Sized + Send + Sync + 'static> LazyModel<T> {
    pub fn new(name: &'static str, factory: ModelFactory<T>) -> Self {
        Self { name, cell: OnceCell::new(), factory }
    }

    /// Already-initialized handle.
    pub fn ready(name: &'static str, model: Arc<T>) -> Self {
        let factory_model = Arc::clone(&model);
        Self { name, cell: OnceCell::new_with(Some(model)), factory: Arc::new(move || Ok(Arc::clone(&factory_model))) }
    }

    pub fn is_initialized(&self) -> bool { self.cell.initialized() }

    pub async fn get(&self) -> anyhow::Result<Arc<T>> {
        let model = self
            .cell
            .get_or_try_init(|| async {
                let start = Instant::now();
                let factory = Arc::clone(&self.factory);
                let model = tokio::task::spawn_blocking(move || factory()).await??;
                info!(model = self.name, elapsed_ms = start.elapsed().as_millis() as u64, "model initialized");
                Ok::<_, anyhow::Error>(model)
            })
            .await?;
        Ok(Arc::clone(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn initializes_once_and_retries_after_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: LazyModel<String> = LazyModel::new(
            "test",
            Arc::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("first load fails");
                }
                Ok(Arc::new("model".to_string()))
            }),
        );
        assert!(!lazy.is_initialized());
        assert!(lazy.get().await.is_err());
        assert_eq!(*lazy.get().await.unwrap(), "model");
        assert_eq!(*lazy.get().await.unwrap(), "model");
        assert!(lazy.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ready_handle_is_initialized() {
        let lazy = LazyModel::ready("test", Arc::new(1u8));
        assert!(lazy.is_initialized());
    }
}
