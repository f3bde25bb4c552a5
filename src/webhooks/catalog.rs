//! Injection catalog.
//!
//! lxcfs exposes container-aware views of a handful of `/proc` files under
//! `/var/lib/lxcfs/proc` on every node. Each one is mounted from the host
//! over its `/proc` counterpart inside every container of a mutated pod.

use k8s_openapi::api::core::v1::{HostPathVolumeSource, Volume, VolumeMount};

/// A named path, either a container mount point or a host path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathEntry {
    pub name: &'static str,
    pub path: &'static str,
}

/// Mount points and backing volumes added to qualifying pods.
///
/// Every mount name has a volume of the same name.
#[derive(Clone, Copy, Debug)]
pub struct InjectionSpec {
    pub mounts: &'static [PathEntry],
    pub volumes: &'static [PathEntry],
}

const LXCFS_MOUNTS: [PathEntry; 6] = [
    PathEntry {
        name: "lxcfs-proc-cpuinfo",
        path: "/proc/cpuinfo",
    },
    PathEntry {
        name: "lxcfs-proc-meminfo",
        path: "/proc/meminfo",
    },
    PathEntry {
        name: "lxcfs-proc-diskstats",
        path: "/proc/diskstats",
    },
    PathEntry {
        name: "lxcfs-proc-stat",
        path: "/proc/stat",
    },
    PathEntry {
        name: "lxcfs-proc-swaps",
        path: "/proc/swaps",
    },
    PathEntry {
        name: "lxcfs-proc-uptime",
        path: "/proc/uptime",
    },
];

const LXCFS_VOLUMES: [PathEntry; 6] = [
    PathEntry {
        name: "lxcfs-proc-cpuinfo",
        path: "/var/lib/lxcfs/proc/cpuinfo",
    },
    PathEntry {
        name: "lxcfs-proc-diskstats",
        path: "/var/lib/lxcfs/proc/diskstats",
    },
    PathEntry {
        name: "lxcfs-proc-meminfo",
        path: "/var/lib/lxcfs/proc/meminfo",
    },
    PathEntry {
        name: "lxcfs-proc-stat",
        path: "/var/lib/lxcfs/proc/stat",
    },
    PathEntry {
        name: "lxcfs-proc-swaps",
        path: "/var/lib/lxcfs/proc/swaps",
    },
    PathEntry {
        name: "lxcfs-proc-uptime",
        path: "/var/lib/lxcfs/proc/uptime",
    },
];

/// The lxcfs `/proc` injection set
pub const LXCFS: InjectionSpec = InjectionSpec {
    mounts: &LXCFS_MOUNTS,
    volumes: &LXCFS_VOLUMES,
};

impl InjectionSpec {
    /// Container volume mounts, in catalog order
    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        self.mounts
            .iter()
            .map(|entry| VolumeMount {
                name: entry.name.to_string(),
                mount_path: entry.path.to_string(),
                ..Default::default()
            })
            .collect()
    }

    /// Host path volumes, in catalog order
    pub fn volumes(&self) -> Vec<Volume> {
        self.volumes
            .iter()
            .map(|entry| Volume {
                name: entry.name.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: entry.path.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect()
    }
}
