//! Internal disposal bag for managing cleanup hooks.

use std::future::Future;

use futures::future::BoxFuture;

pub(crate) type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Container for async disposal hooks with LIFO execution order.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<Hook>,
}

impl DisposeBag {
    /// Add an asynchronous disposal hook.
    pub(crate) fn push<Fut, F>(&mut self, f: F)
    where
        Fut: Future<Output = ()> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
    {
        self.hooks.push(Box::new(move || Box::pin(f())));
    }

    /// Takes every hook out of the bag, most recent first.
    ///
    /// Callers run the hooks after releasing whatever lock guards the bag.
    pub(crate) fn drain_reverse(&mut self) -> Vec<Hook> {
        let mut hooks = std::mem::take(&mut self.hooks);
        hooks.reverse();
        hooks
    }

    /// Check if the bag is empty (no disposers registered).
    pub(crate) fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Runs hooks in the order given.
pub(crate) async fn run_hooks(hooks: Vec<Hook>) {
    for hook in hooks {
        hook().await;
    }
}
