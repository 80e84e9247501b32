//! Mutation orchestrator
//!
//! Turns one Pod into a [`Decision`]: skip it, reject it, or mutate it with a
//! JSON patch. Evaluation is a pure function of the pod and the immutable
//! [`InjectorConfig`], so a single [`Mutator`] serves concurrent requests.

use std::collections::BTreeSet;
use std::sync::Arc;

use injector_common::{InjectorConfig, INJECT_ANNOTATION, STATUS_ANNOTATION, STATUS_INJECTED};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Pod, Volume, VolumeMount};
use tracing::debug;

use crate::container::{transform_container, ContainerPath, BIN_MOUNT_PATH, BIN_VOLUME_NAME};
use crate::credentials::inject_credentials;
use crate::defaults::default_bootstrap_pair;
use crate::error::{Result, WebhookError};
use crate::patch::{self, PatchOp, INIT_CONTAINERS_PATH, VOLUMES_PATH};
use crate::policy::{helper_version, mutation_required, select_targets};

/// Name of the init container copying the op CLI into the shared volume
pub const BOOTSTRAP_CONTAINER_NAME: &str = "copy-op-bin";

/// Image repository of the op CLI
pub const OP_IMAGE: &str = "1password/op";

/// Why a pod was admitted unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The pod lives in an ignored namespace
    IgnoredNamespace,
    /// No opt-in annotation, or the pod is already injected
    NotRequired,
    /// The opt-in annotation names no container
    NoTargets,
    /// None of the named containers exist in the pod
    NoMatchingContainers,
}

/// Outcome of evaluating one pod
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Admit unchanged
    Skip(SkipReason),
    /// Admit with this patch
    Mutate(Vec<PatchOp>),
    /// Admit unchanged, reporting why injection could not happen
    Reject(String),
}

impl Decision {
    /// Patch operations carried by a `Mutate` decision
    pub fn patch_ops(&self) -> &[PatchOp] {
        match self {
            Decision::Mutate(ops) => ops,
            Decision::Skip(_) | Decision::Reject(_) => &[],
        }
    }
}

/// In-memory volume shared between the bootstrap init container and wrapped containers
pub fn bin_volume() -> Volume {
    Volume {
        name: BIN_VOLUME_NAME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Init container copying the op CLI binary into the shared volume
pub fn bootstrap_container(version: &str) -> Container {
    Container {
        name: BOOTSTRAP_CONTAINER_NAME.to_string(),
        image: Some(format!("{OP_IMAGE}:{version}")),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cp /usr/local/bin/op {BIN_MOUNT_PATH}"),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: BIN_VOLUME_NAME.to_string(),
            mount_path: BIN_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Evaluates pods against the injection policy
#[derive(Debug, Clone)]
pub struct Mutator {
    config: Arc<InjectorConfig>,
}

impl Mutator {
    /// Create a mutator from validated configuration
    pub fn new(config: InjectorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Configuration this mutator was built with
    pub fn config(&self) -> &InjectorConfig {
        &self.config
    }

    /// Decide what to do with `pod`
    ///
    /// A targeted container without a command turns the whole evaluation into
    /// a [`Decision::Reject`]; no partial patch is ever returned. `Err` is
    /// reserved for serialization failures.
    pub fn evaluate(&self, pod: &Pod) -> Result<Decision> {
        let meta = &pod.metadata;

        if !mutation_required(&self.config.ignored_namespaces, meta) {
            let namespace = meta.namespace.as_deref().unwrap_or_default();
            let reason = if self.config.is_ignored(namespace) {
                SkipReason::IgnoredNamespace
            } else {
                SkipReason::NotRequired
            };
            return Ok(Decision::Skip(reason));
        }

        let annotations = meta.annotations.as_ref();
        let targets = select_targets(
            annotations
                .and_then(|a| a.get(INJECT_ANNOTATION))
                .map(String::as_str)
                .unwrap_or_default(),
        );
        if targets.is_empty() {
            return Ok(Decision::Skip(SkipReason::NoTargets));
        }

        let container_ops = match self.wrap_targets(pod, &targets) {
            Ok(Some(ops)) => ops,
            Ok(None) => return Ok(Decision::Skip(SkipReason::NoMatchingContainers)),
            Err(e @ WebhookError::MissingCommand { .. }) => {
                return Ok(Decision::Reject(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let (init_container, volume) =
            default_bootstrap_pair(bootstrap_container(helper_version(annotations)), bin_volume());

        let spec = pod.spec.as_ref();
        let volumes = spec
            .and_then(|s| s.volumes.as_deref())
            .unwrap_or_default();
        let init_containers = spec
            .and_then(|s| s.init_containers.as_deref())
            .unwrap_or_default();

        let mut ops = Vec::with_capacity(container_ops.len() + 3);
        if !volumes.iter().any(|v| v.name == BIN_VOLUME_NAME) {
            ops.push(patch::add_or_append(
                volumes.is_empty(),
                &PointerBuf::from_tokens(VOLUMES_PATH),
                patch::to_value(&volume)?,
            ));
        }
        // Init container indices in `container_ops` are only valid before the
        // bootstrap container is inserted at the front.
        ops.extend(container_ops);
        if !init_containers
            .iter()
            .any(|c| c.name == BOOTSTRAP_CONTAINER_NAME)
        {
            ops.push(patch::add_or_prepend(
                init_containers.is_empty(),
                &PointerBuf::from_tokens(INIT_CONTAINERS_PATH),
                patch::to_value(&init_container)?,
            ));
        }
        ops.push(patch::upsert_annotation(
            annotations,
            STATUS_ANNOTATION,
            STATUS_INJECTED,
        ));

        Ok(Decision::Mutate(ops))
    }

    /// Wrap every targeted container, init containers first
    ///
    /// `None` when no container in the pod is targeted.
    fn wrap_targets(
        &self,
        pod: &Pod,
        targets: &BTreeSet<String>,
    ) -> Result<Option<Vec<PatchOp>>> {
        let Some(spec) = pod.spec.as_ref() else {
            return Ok(None);
        };

        let init = spec
            .init_containers
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, c)| (ContainerPath::init(i), c));
        let main = spec
            .containers
            .iter()
            .enumerate()
            .map(|(i, c)| (ContainerPath::main(i), c));

        let mut ops = Vec::new();
        let mut matched = false;
        for (path, container) in init.chain(main) {
            if !targets.contains(&container.name) {
                continue;
            }
            matched = true;
            let transformed = transform_container(container, path)?;
            ops.extend(transformed.ops);
            ops.extend(inject_credentials(&transformed.container, path, &self.config)?);
            debug!(
                container = %container.name,
                path = %path.pointer(),
                "Wrapped container with op run"
            );
        }
        Ok(matched.then_some(ops))
    }
}
