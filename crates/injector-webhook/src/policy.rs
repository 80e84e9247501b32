//! Injection policy: which pods and which containers get the op CLI

use std::collections::{BTreeMap, BTreeSet};

use injector_common::{
    DEFAULT_VERSION, INJECT_ANNOTATION, STATUS_ANNOTATION, STATUS_INJECTED, VERSION_ANNOTATION,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

/// Check whether a pod needs to be mutated
///
/// Pods in an ignored namespace never are. Otherwise the opt-in annotation
/// must be present and the status annotation must not already read
/// `injected` (compared case-insensitively).
pub fn mutation_required(ignored_namespaces: &[String], meta: &ObjectMeta) -> bool {
    let namespace = meta.namespace.as_deref().unwrap_or_default();
    let name = meta.name.as_deref().unwrap_or_default();

    if ignored_namespaces.iter().any(|ns| ns == namespace) {
        info!(
            namespace = %namespace,
            name = %name,
            "Skipping mutation in special namespace"
        );
        return false;
    }

    let annotations = meta.annotations.as_ref();
    let status = annotations
        .and_then(|a| a.get(STATUS_ANNOTATION))
        .map(String::as_str)
        .unwrap_or_default();
    let enabled = annotations.is_some_and(|a| a.contains_key(INJECT_ANNOTATION));

    let required = enabled && !status.eq_ignore_ascii_case(STATUS_INJECTED);

    info!(
        namespace = %namespace,
        name = %name,
        status = %status,
        required,
        "Mutation policy evaluated"
    );
    required
}

/// Container names listed in the opt-in annotation value
///
/// Entries are trimmed and blanks dropped, so an empty result means no
/// container was selected.
pub fn select_targets(opt_in: &str) -> BTreeSet<String> {
    opt_in
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// op CLI image tag requested by the version annotation
pub fn helper_version(annotations: Option<&BTreeMap<String, String>>) -> &str {
    annotations
        .and_then(|a| a.get(VERSION_ANNOTATION))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignored() -> Vec<String> {
        vec!["kube-system".to_string(), "kube-public".to_string()]
    }

    fn meta(namespace: &str, annotations: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some(namespace.to_string()),
            annotations: if annotations.is_empty() {
                None
            } else {
                Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                )
            },
            ..Default::default()
        }
    }

    #[test]
    fn opted_in_pod_requires_mutation() {
        let meta = meta("default", &[(INJECT_ANNOTATION, "app")]);
        assert!(mutation_required(&ignored(), &meta));
    }

    #[test]
    fn ignored_namespace_never_requires_mutation() {
        let meta = meta("kube-system", &[(INJECT_ANNOTATION, "app")]);
        assert!(!mutation_required(&ignored(), &meta));
    }

    #[test]
    fn missing_opt_in_does_not_require_mutation() {
        assert!(!mutation_required(&ignored(), &meta("default", &[])));
        let meta = meta("default", &[(VERSION_ANNOTATION, "2")]);
        assert!(!mutation_required(&ignored(), &meta));
    }

    #[test]
    fn injected_status_short_circuits_case_insensitively() {
        for status in ["injected", "Injected", "INJECTED"] {
            let meta = meta(
                "default",
                &[(INJECT_ANNOTATION, "app"), (STATUS_ANNOTATION, status)],
            );
            assert!(!mutation_required(&ignored(), &meta), "status {status}");
        }
    }

    #[test]
    fn stale_status_requires_mutation_again() {
        let meta = meta(
            "default",
            &[(INJECT_ANNOTATION, "app"), (STATUS_ANNOTATION, "pending")],
        );
        assert!(mutation_required(&ignored(), &meta));
    }

    #[test]
    fn empty_opt_in_still_counts_as_present() {
        // Presence decides the policy; select_targets turns "" into no work.
        let meta = meta("default", &[(INJECT_ANNOTATION, "")]);
        assert!(mutation_required(&ignored(), &meta));
    }

    #[test]
    fn select_targets_splits_and_trims() {
        let targets = select_targets("app, sidecar ,,migrate");
        assert_eq!(
            targets.into_iter().collect::<Vec<_>>(),
            vec!["app", "migrate", "sidecar"]
        );
    }

    #[test]
    fn select_targets_empty_value_selects_nothing() {
        assert!(select_targets("").is_empty());
        assert!(select_targets(" , ").is_empty());
    }

    #[test]
    fn helper_version_defaults_to_latest() {
        assert_eq!(helper_version(None), "latest");
        let blank = BTreeMap::from([(VERSION_ANNOTATION.to_string(), " ".to_string())]);
        assert_eq!(helper_version(Some(&blank)), "latest");
        let pinned = BTreeMap::from([(VERSION_ANNOTATION.to_string(), "2.24.0".to_string())]);
        assert_eq!(helper_version(Some(&pinned)), "2.24.0");
    }
}
