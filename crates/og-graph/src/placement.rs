use std::collections::BTreeMap;

use og_tensor::Axis;

/// Device identity of a node: one device, or one device per shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceIds {
    Single(usize),
    Sharded(Vec<usize>),
}

impl DeviceIds {
    /// The per-shard device list, if this is a sharded placement.
    pub fn as_sharded(&self) -> Option<&[usize]> {
        match self {
            DeviceIds::Sharded(ids) => Some(ids),
            DeviceIds::Single(_) => None,
        }
    }

    /// Number of devices covered.
    pub fn len(&self) -> usize {
        match self {
            DeviceIds::Single(_) => 1,
            DeviceIds::Sharded(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a node runs, as assigned by the device-assignment pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placement {
    /// Device kind, e.g. "cpu" or "gpu".
    pub device: String,
    pub device_id: DeviceIds,
    /// Name of the transformer (backend) executing the node.
    pub transformer: String,
    /// Name of the transformer driving the host side.
    pub host_transformer: String,
}

impl Placement {
    /// Placement on a single device.
    pub fn single(
        device: impl Into<String>,
        device_id: usize,
        transformer: impl Into<String>,
        host_transformer: impl Into<String>,
    ) -> Self {
        Placement {
            device: device.into(),
            device_id: DeviceIds::Single(device_id),
            transformer: transformer.into(),
            host_transformer: host_transformer.into(),
        }
    }

    /// Placement spread over several devices, one shard each.
    pub fn sharded(
        device: impl Into<String>,
        device_ids: Vec<usize>,
        transformer: impl Into<String>,
        host_transformer: impl Into<String>,
    ) -> Self {
        Placement {
            device: device.into(),
            device_id: DeviceIds::Sharded(device_ids),
            transformer: transformer.into(),
            host_transformer: host_transformer.into(),
        }
    }

    /// Returns true if both placements name the same device kind and ids.
    pub fn same_devices(&self, other: &Placement) -> bool {
        self.device == other.device && self.device_id == other.device_id
    }
}

/// Role markers set on communication ops for the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The op reassembles shards into one value.
    Gather,
}

/// Per-node annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub placement: Option<Placement>,
    /// The axis split across devices for this node.
    pub parallel: Option<Axis>,
    pub marker: Option<Marker>,
    /// Backend-specific annotations; not interpreted by the graph core.
    pub extensions: BTreeMap<String, String>,
}

impl Metadata {
    pub fn placed(placement: Placement) -> Self {
        Metadata {
            placement: Some(placement),
            ..Default::default()
        }
    }

    pub fn with_parallel(mut self, axis: Axis) -> Self {
        self.parallel = Some(axis);
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }
}
