//! Deferred keyword checks, run after a successful synchronous pass.

use std::fmt;

use futures::future::join_all;
use serde_json::{json, Value};
use teleflow_core::{path, ErrorEntry, ValidationError, ValidationFailure};
use tracing::{debug, info};

use crate::keywords::{DeferredCheck, Keyword};

/// Groups of deferred keywords in execution order. Checks of one group run
/// concurrently; a group starts only after the previous one fully
/// succeeded.
pub const ASYNC_ORDER: [&[Keyword]; 2] = [
    &[Keyword::HostConnectivityCheck, Keyword::PathExists],
    &[Keyword::F5Secret],
];

/// A queued deferred check with the location it reports errors at.
pub struct DeferredEntry {
    pub keyword: Keyword,
    pub data_path: String,
    pub schema_path: String,
    pub property_name: Option<String>,
    pub check: DeferredCheck,
}

impl fmt::Debug for DeferredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredEntry")
            .field("keyword", &self.keyword)
            .field("data_path", &self.data_path)
            .finish_non_exhaustive()
    }
}

/// Split the queue into [`ASYNC_ORDER`] groups. Keywords missing from the
/// order form a trailing group.
fn into_groups(queue: Vec<DeferredEntry>) -> Vec<Vec<DeferredEntry>> {
    let mut groups: Vec<Vec<DeferredEntry>> = ASYNC_ORDER.iter().map(|_| Vec::new()).collect();
    let mut rest = Vec::new();
    for entry in queue {
        match ASYNC_ORDER.iter().position(|g| g.contains(&entry.keyword)) {
            Some(i) => groups[i].push(entry),
            None => rest.push(entry),
        }
    }
    groups.push(rest);
    groups.retain(|g| !g.is_empty());
    groups
}

/// Run the queued checks group by group, applying replacement values to
/// `doc` after each group. Values applied by an earlier group stay applied
/// when a later group fails.
pub async fn run_deferred(
    mut doc: Value,
    queue: Vec<DeferredEntry>,
) -> Result<Value, ValidationFailure> {
    for (index, group) in into_groups(queue).into_iter().enumerate() {
        debug!(group = index, checks = group.len(), "running deferred checks");

        let results = join_all(group.into_iter().map(|entry| {
            let DeferredEntry {
                keyword,
                data_path,
                schema_path,
                property_name,
                check,
            } = entry;
            let fut = check();
            async move { (keyword, data_path, schema_path, property_name, fut.await) }
        }))
        .await;

        let mut errors: Vec<ErrorEntry> = Vec::new();
        let mut patches = Vec::new();
        for (keyword, data_path, schema_path, property_name, result) in results {
            match result {
                Ok(Some(value)) => patches.push((data_path, value)),
                Ok(None) => {}
                Err(message) => errors.push(
                    ValidationError::new(keyword.name(), data_path, schema_path, message)
                        .with_params(json!({"keyword": keyword.name()}))
                        .with_property_name(property_name)
                        .into(),
                ),
            }
        }

        if !errors.is_empty() {
            info!(group = index, failed = errors.len(), "deferred checks failed");
            return Err(ValidationFailure::new(errors));
        }
        for (data_path, value) in patches {
            if !path::replace(&mut doc, &data_path, value) {
                debug!(path = %data_path, "deferred result target vanished");
            }
        }
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    fn entry(
        keyword: Keyword,
        data_path: &str,
        calls: Arc<AtomicUsize>,
        result: Result<Option<Value>, String>,
    ) -> DeferredEntry {
        DeferredEntry {
            keyword,
            data_path: data_path.to_string(),
            schema_path: format!("#/x/{}", keyword.name()),
            property_name: None,
            check: Box::new(move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    result
                }
                .boxed()
            }),
        }
    }

    #[tokio::test]
    async fn failing_group_stops_later_groups() {
        let path_calls = Arc::new(AtomicUsize::new(0));
        let secret_calls = Arc::new(AtomicUsize::new(0));
        // Queued out of order on purpose.
        let queue = vec![
            entry(Keyword::F5Secret, "/s", secret_calls.clone(), Ok(Some(json!("enc")))),
            entry(Keyword::PathExists, "/p", path_calls.clone(), Err("no access".into())),
        ];
        let failure = run_deferred(json!({"s": "plain", "p": "/x"}), queue)
            .await
            .unwrap_err();

        assert_eq!(path_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secret_calls.load(Ordering::SeqCst), 0);
        let errors: Vec<_> = failure.validation_errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "pathExists");
        assert_eq!(errors[0].data_path, "/p");
        assert_eq!(errors[0].message, "no access");
    }

    #[tokio::test]
    async fn group_failures_are_aggregated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = vec![
            entry(Keyword::PathExists, "/a", calls.clone(), Err("a".into())),
            entry(Keyword::HostConnectivityCheck, "/b", calls.clone(), Err("b".into())),
        ];
        let failure = run_deferred(json!({}), queue).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(failure.errors.len(), 2);
    }

    #[tokio::test]
    async fn replacements_applied_after_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = vec![
            entry(Keyword::PathExists, "/p", calls.clone(), Ok(None)),
            entry(Keyword::F5Secret, "/s", calls.clone(), Ok(Some(json!({"cipherText": "$M$x"})))),
        ];
        let doc = run_deferred(json!({"s": {"cipherText": "x"}, "p": "/tmp"}), queue)
            .await
            .unwrap();
        assert_eq!(doc["s"]["cipherText"], "$M$x");
        assert_eq!(doc["p"], "/tmp");
    }

    #[tokio::test]
    async fn empty_queue_returns_document() {
        let doc = run_deferred(json!({"a": 1}), Vec::new()).await.unwrap();
        assert_eq!(doc, json!({"a": 1}));
    }
}
