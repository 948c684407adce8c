//! Aggregate health resolution over a dependency and its descendants.

use crate::dependency::Dependency;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;

/// Results already computed during one evaluation, keyed by dependency name.
pub type Memo = HashMap<String, bool>;

/// Resolve whether `dependency` and everything it transitively depends on
/// are healthy.
///
/// Uses a fresh [`Memo`] for this call only.
pub async fn is_healthy(dependency: &Dependency) -> bool {
    let mut memo = Memo::new();
    is_healthy_with(dependency, &mut memo).await
}

/// Resolve health with a caller-supplied memo table.
///
/// A dependency already present in `memo` is never resolved again, which
/// bounds the work on cyclic graphs. The own result is memoised before the
/// children are visited, so a cycle back to this dependency sees it. Children
/// are evaluated in order and evaluation stops at the first unhealthy one.
pub fn is_healthy_with<'a>(dependency: &'a Dependency, memo: &'a mut Memo) -> BoxFuture<'a, bool> {
    async move {
        if let Some(&healthy) = memo.get(dependency.name()) {
            return healthy;
        }

        let healthy = dependency.resolve().await;
        memo.insert(dependency.name().to_string(), healthy);
        if !healthy {
            return false;
        }

        for child in dependency.dependencies() {
            if !is_healthy_with(&child, memo).await {
                return false;
            }
        }

        true
    }
    .boxed()
}
