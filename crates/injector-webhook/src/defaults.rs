//! Explicit API server defaulting for the objects the injector adds
//!
//! The injected init container and volume are filled with the values the API
//! server would default, so the patch describes the object as it will be
//! stored and re-admission compares like with like.

use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Volume};

/// Default `terminationMessagePath` for containers
pub const DEFAULT_TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";

/// Default `terminationMessagePolicy` for containers
pub const DEFAULT_TERMINATION_MESSAGE_POLICY: &str = "File";

/// Fill unset termination message fields with their API server defaults
pub fn default_container(mut container: Container) -> Container {
    container
        .termination_message_path
        .get_or_insert_with(|| DEFAULT_TERMINATION_MESSAGE_PATH.to_string());
    container
        .termination_message_policy
        .get_or_insert_with(|| DEFAULT_TERMINATION_MESSAGE_POLICY.to_string());
    container
}

/// A volume without any source becomes an `emptyDir`
pub fn default_volume(mut volume: Volume) -> Volume {
    if !has_source(&volume) {
        volume.empty_dir = Some(EmptyDirVolumeSource::default());
    }
    volume
}

/// Default an injected container together with the volume it mounts
pub fn default_bootstrap_pair(container: Container, volume: Volume) -> (Container, Volume) {
    (default_container(container), default_volume(volume))
}

fn has_source(v: &Volume) -> bool {
    v.empty_dir.is_some()
        || v.secret.is_some()
        || v.config_map.is_some()
        || v.projected.is_some()
        || v.downward_api.is_some()
        || v.persistent_volume_claim.is_some()
        || v.host_path.is_some()
        || v.csi.is_some()
        || v.ephemeral.is_some()
        || v.image.is_some()
        || v.nfs.is_some()
        || v.iscsi.is_some()
        || v.fc.is_some()
        || v.rbd.is_some()
        || v.cephfs.is_some()
        || v.glusterfs.is_some()
        || v.git_repo.is_some()
        || v.flex_volume.is_some()
        || v.flocker.is_some()
        || v.cinder.is_some()
        || v.quobyte.is_some()
        || v.scale_io.is_some()
        || v.storageos.is_some()
        || v.portworx_volume.is_some()
        || v.photon_persistent_disk.is_some()
        || v.vsphere_volume.is_some()
        || v.azure_disk.is_some()
        || v.azure_file.is_some()
        || v.aws_elastic_block_store.is_some()
        || v.gce_persistent_disk.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PersistentVolumeClaimVolumeSource, SecretVolumeSource};

    #[test]
    fn container_defaults_fill_unset_fields() {
        let container = default_container(Container {
            name: "copy".to_string(),
            image: Some("1password/op:2".to_string()),
            ..Default::default()
        });
        assert_eq!(
            container.termination_message_path.as_deref(),
            Some("/dev/termination-log")
        );
        assert_eq!(container.termination_message_policy.as_deref(), Some("File"));
        assert!(container.image_pull_policy.is_none());
    }

    #[test]
    fn container_defaults_keep_explicit_values() {
        let container = default_container(Container {
            name: "copy".to_string(),
            termination_message_policy: Some("FallbackToLogsOnError".to_string()),
            ..Default::default()
        });
        assert_eq!(
            container.termination_message_policy.as_deref(),
            Some("FallbackToLogsOnError")
        );
    }

    #[test]
    fn sourceless_volume_becomes_empty_dir() {
        let volume = default_volume(Volume {
            name: "scratch".to_string(),
            ..Default::default()
        });
        assert!(volume.empty_dir.is_some());
    }

    #[test]
    fn empty_dir_medium_is_preserved() {
        let volume = default_volume(Volume {
            name: "op-bin".to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(
            volume.empty_dir.and_then(|e| e.medium).as_deref(),
            Some("Memory")
        );
    }

    #[test]
    fn volumes_with_a_source_are_left_alone() {
        let secret = default_volume(Volume {
            name: "token".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some("token".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(secret.empty_dir.is_none());

        let claim = default_volume(Volume {
            name: "data".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: "data".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(claim.empty_dir.is_none());
    }
}
