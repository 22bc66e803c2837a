//! Maps declared volumes to pod volumes and container mounts

use std::collections::BTreeSet;

use podwright_common::naming::sanitize_dns_label;
use podwright_common::{ControllerConfig, Error, Result, VolumeDecl};

use crate::container::{TOOLING_VOLUME_NAME, WORKDIR_VOLUME_NAME};
use crate::k8s::{Volume, VolumeMount};

/// Volumes and mounts, index-aligned with the declarations they came from
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedVolumes {
    pub volumes: Vec<Volume>,
    pub mounts: Vec<VolumeMount>,
}

/// Resolve every declaration into a (volume, mount) pair.
///
/// Fails on the first declaration of an unsupported kind, and on any
/// volume whose sanitized name or mount path is empty, repeats an earlier
/// declaration, or collides with the built-in workdir and tooling volumes.
pub fn resolve(
    unit_id: &str,
    declared: &[VolumeDecl],
    config: &ControllerConfig,
) -> Result<ResolvedVolumes> {
    let mut names = BTreeSet::from([WORKDIR_VOLUME_NAME, TOOLING_VOLUME_NAME].map(String::from));
    let mut paths = BTreeSet::from([
        config.workspace_path.clone(),
        config.tooling_mount_path.clone(),
    ]);

    let mut resolved = ResolvedVolumes::default();
    for (index, decl) in declared.iter().enumerate() {
        let (volume, mount) = resolve_one(index, decl)?;
        if volume.name.is_empty() || !names.insert(volume.name.clone()) {
            return Err(Error::validation_for_field(
                unit_id,
                format!("volumes[{index}].name"),
                format!("volume name '{}' is empty or already in use", volume.name),
            ));
        }
        if mount.mount_path.is_empty() || !paths.insert(mount.mount_path.clone()) {
            return Err(Error::validation_for_field(
                unit_id,
                format!("volumes[{index}].mountPath"),
                format!("mount path '{}' is empty or already in use", mount.mount_path),
            ));
        }
        resolved.volumes.push(volume);
        resolved.mounts.push(mount);
    }
    Ok(resolved)
}

fn resolve_one(index: usize, decl: &VolumeDecl) -> Result<(Volume, VolumeMount)> {
    match decl {
        VolumeDecl::EmptyDir {
            name,
            mount_path,
            medium,
            size_limit,
        } => {
            let name = sanitize_dns_label(name);
            Ok((
                Volume::from_empty_dir(&name, medium.clone(), size_limit.clone()),
                VolumeMount::new(name, mount_path),
            ))
        }
        VolumeDecl::HostPath {
            name,
            mount_path,
            host_path,
            path_type,
        } => {
            let name = sanitize_dns_label(name);
            Ok((
                Volume::from_host_path(&name, host_path, path_type.clone()),
                VolumeMount::new(name, mount_path),
            ))
        }
        VolumeDecl::PersistentClaim {
            name,
            mount_path,
            claim_name,
            read_only,
        } => {
            let name = sanitize_dns_label(name);
            let mount = VolumeMount {
                read_only: read_only.then_some(true),
                ..VolumeMount::new(&name, mount_path)
            };
            Ok((Volume::from_pvc(name, claim_name, *read_only), mount))
        }
        VolumeDecl::Unsupported => Err(Error::UnsupportedVolumeKind { index }),
    }
}
