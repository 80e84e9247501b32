//! Container transformer
//!
//! Wraps a container's entrypoint with `op run --` and mounts the shared
//! volume holding the op CLI binary.

use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Container, VolumeMount};
use serde_json::Value;

use crate::error::{Result, WebhookError};
use crate::patch::{self, PatchOp, PatchValue, CONTAINERS_PATH, INIT_CONTAINERS_PATH};

/// Name of the shared in-memory volume holding the op CLI
pub const BIN_VOLUME_NAME: &str = "op-bin";

/// Mount path of the shared volume in every container
pub const BIN_MOUNT_PATH: &str = "/op/bin/";

/// Tokens prepended to a wrapped container's command
pub const COMMAND_PREFIX: [&str; 3] = ["/op/bin/op", "run", "--"];

/// Which pod sequence a container lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContainerKind {
    /// `spec.initContainers`
    Init,
    /// `spec.containers`
    Main,
}

impl ContainerKind {
    fn base(self) -> [&'static str; 2] {
        match self {
            ContainerKind::Init => INIT_CONTAINERS_PATH,
            ContainerKind::Main => CONTAINERS_PATH,
        }
    }
}

/// Position of a container inside the pod spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerPath {
    /// Sequence holding the container
    pub kind: ContainerKind,
    /// Index within that sequence
    pub index: usize,
}

impl ContainerPath {
    /// Container `index` of `spec.initContainers`
    pub fn init(index: usize) -> Self {
        Self {
            kind: ContainerKind::Init,
            index,
        }
    }

    /// Container `index` of `spec.containers`
    pub fn main(index: usize) -> Self {
        Self {
            kind: ContainerKind::Main,
            index,
        }
    }

    /// Pointer to the container itself, e.g. `/spec/containers/0`
    pub fn pointer(&self) -> PointerBuf {
        let mut path = PointerBuf::from_tokens(self.kind.base());
        path.push_back(self.index.to_string());
        path
    }

    /// Pointer to one field of the container, e.g. `/spec/containers/0/env`
    pub fn field(&self, name: &str) -> PointerBuf {
        let mut path = self.pointer();
        path.push_back(name);
        path
    }
}

/// Read-only mount of the shared op CLI volume
pub fn bin_volume_mount() -> VolumeMount {
    VolumeMount {
        name: BIN_VOLUME_NAME.to_string(),
        mount_path: BIN_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

/// Result of wrapping one container
#[derive(Debug, Clone)]
pub struct TransformedContainer {
    /// Local copy of the container after the rewrite
    pub container: Container,
    /// Operations expressing the rewrite against the pod
    pub ops: Vec<PatchOp>,
}

/// Wrap `container` with the op CLI
///
/// Emits the shared volume mount followed by a `replace` of the command. A
/// mount named `op-bin` or a command already starting with the `op run`
/// prefix is left as is. Fails when the container has no command, since
/// there is nothing to wrap.
pub fn transform_container(
    container: &Container,
    path: ContainerPath,
) -> Result<TransformedContainer> {
    let command = match container.command.as_deref() {
        Some(command) if !command.is_empty() => command,
        _ => return Err(WebhookError::missing_command(&container.name)),
    };

    let mut mutated = container.clone();
    let mut ops = Vec::with_capacity(2);

    let existing_mounts = container.volume_mounts.as_deref().unwrap_or_default();
    if !existing_mounts.iter().any(|m| m.name == BIN_VOLUME_NAME) {
        let mount = bin_volume_mount();
        ops.push(patch::add_or_append(
            existing_mounts.is_empty(),
            &path.field("volumeMounts"),
            patch::to_value(&mount)?,
        ));
        mutated.volume_mounts.get_or_insert_with(Vec::new).push(mount);
    }

    if !is_wrapped(command) {
        let wrapped: Vec<String> = COMMAND_PREFIX
            .iter()
            .map(|token| token.to_string())
            .chain(command.iter().cloned())
            .collect();
        ops.push(PatchOp::replace(
            path.field("command"),
            PatchValue::Collection(wrapped.iter().cloned().map(Value::String).collect()),
        ));
        mutated.command = Some(wrapped);
    }

    Ok(TransformedContainer {
        container: mutated,
        ops,
    })
}

/// Whether `command` already starts with the `op run --` prefix
fn is_wrapped(command: &[String]) -> bool {
    command.len() >= COMMAND_PREFIX.len()
        && command.iter().zip(COMMAND_PREFIX).all(|(token, prefix)| token == prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn container(name: &str, command: &[&str]) -> Container {
        Container {
            name: name.to_string(),
            image: Some("app:v1".to_string()),
            command: Some(command.iter().map(|c| c.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn container_paths_address_their_sequence() {
        assert_eq!(ContainerPath::main(2).pointer().as_str(), "/spec/containers/2");
        assert_eq!(
            ContainerPath::init(0).field("env").as_str(),
            "/spec/initContainers/0/env"
        );
    }

    #[test]
    fn command_is_prefixed_with_op_run() {
        let app = container("app", &["/bin/server", "--port", "80"]);
        let result = transform_container(&app, ContainerPath::main(0)).unwrap();
        assert_eq!(
            result.container.command.unwrap(),
            vec!["/op/bin/op", "run", "--", "/bin/server", "--port", "80"]
        );
        let replace = &result.ops[1];
        assert_eq!(replace.op(), "replace");
        assert_eq!(replace.path().as_str(), "/spec/containers/0/command");
        assert_eq!(
            replace.value(),
            &PatchValue::Collection(vec![
                json!("/op/bin/op"),
                json!("run"),
                json!("--"),
                json!("/bin/server"),
                json!("--port"),
                json!("80"),
            ])
        );
    }

    #[test]
    fn first_mount_creates_volume_mounts() {
        let app = container("app", &["/bin/server"]);
        let result = transform_container(&app, ContainerPath::main(1)).unwrap();
        let mount = &result.ops[0];
        assert_eq!(mount.path().as_str(), "/spec/containers/1/volumeMounts");
        assert_eq!(
            mount.value(),
            &PatchValue::Collection(vec![json!({
                "mountPath": "/op/bin/",
                "name": "op-bin",
                "readOnly": true
            })])
        );
    }

    #[test]
    fn existing_mounts_are_appended_to() {
        let mut c = container("app", &["/bin/server"]);
        c.volume_mounts = Some(vec![VolumeMount {
            name: "data".to_string(),
            mount_path: "/data".to_string(),
            ..Default::default()
        }]);
        let result = transform_container(&c, ContainerPath::main(0)).unwrap();
        assert_eq!(
            result.ops[0].path().as_str(),
            "/spec/containers/0/volumeMounts/-"
        );
        assert_eq!(result.container.volume_mounts.unwrap().len(), 2);
    }

    /// Story: a container left over from an earlier injection is not wrapped twice
    #[test]
    fn story_already_wrapped_container_is_left_alone() {
        let mut c = container("app", &["/op/bin/op", "run", "--", "/bin/server"]);
        c.volume_mounts = Some(vec![bin_volume_mount()]);
        let result = transform_container(&c, ContainerPath::main(0)).unwrap();
        assert!(result.ops.is_empty());
        assert_eq!(result.container.volume_mounts.unwrap().len(), 1);
        assert_eq!(
            result.container.command.unwrap(),
            vec!["/op/bin/op", "run", "--", "/bin/server"]
        );
    }

    #[test]
    fn existing_bin_mount_still_gets_command_wrapped() {
        let mut c = container("app", &["/bin/server"]);
        c.volume_mounts = Some(vec![bin_volume_mount()]);
        let result = transform_container(&c, ContainerPath::main(0)).unwrap();
        assert_eq!(result.ops.len(), 1);
        assert_eq!(result.ops[0].path().as_str(), "/spec/containers/0/command");
    }

    #[test]
    fn partial_prefix_is_still_wrapped() {
        let c = container("app", &["/op/bin/op", "whoami"]);
        let result = transform_container(&c, ContainerPath::main(0)).unwrap();
        assert_eq!(
            result.container.command.unwrap(),
            vec!["/op/bin/op", "run", "--", "/op/bin/op", "whoami"]
        );
    }

    #[test]
    fn missing_command_is_an_error() {
        let mut c = container("app", &[]);
        let err = transform_container(&c, ContainerPath::main(0)).unwrap_err();
        assert!(matches!(
            err,
            WebhookError::MissingCommand { ref container } if container == "app"
        ));

        c.command = None;
        assert!(transform_container(&c, ContainerPath::main(0)).is_err());
    }

    #[test]
    fn init_container_ops_use_init_path() {
        let migrate = container("migrate", &["/migrate"]);
        let result = transform_container(&migrate, ContainerPath::init(3)).unwrap();
        assert!(result
            .ops
            .iter()
            .all(|op| op.path().as_str().starts_with("/spec/initContainers/3/")));
    }
}
