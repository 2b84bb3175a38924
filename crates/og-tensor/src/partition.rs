//! Splitting one axis of a shape across a fixed number of devices.
//!
//! The split is `base = length / n` elements per device, with the remainder
//! `length % n` appended to the last device. Every other axis is left whole.
//! [`partition_axes`] and [`partition_slices`] both derive their per-device
//! ranges from [`shard_bounds`], so lengths and slices always agree.

use crate::axis::{Axes, Axis, Slice};
use crate::error::{Result, TensorError};

/// Half-open `[start, stop)` range of device `device_index` when an axis of
/// `length` elements is split across `device_count` devices.
///
/// The last device absorbs the remainder of an uneven split. Shards may be
/// empty when `length < device_count`.
pub fn shard_bounds(length: usize, device_count: usize, device_index: usize) -> Result<(usize, usize)> {
    if device_count == 0 {
        return Err(TensorError::ZeroDevices);
    }
    if device_index >= device_count {
        return Err(TensorError::Other(format!(
            "device index {} out of range for {} devices",
            device_index, device_count
        )));
    }
    let base = length / device_count;
    let remainder = length % device_count;
    let start = device_index * base;
    let mut stop = start + base;
    if device_index == device_count - 1 {
        stop += remainder;
    }
    Ok((start, stop))
}

/// Per-device axes when `target` is split across `device_count` devices.
///
/// Returns one `Axes` per device, in device order. If `target` does not
/// appear in `axes`, every device receives the original axes unchanged.
pub fn partition_axes(axes: &Axes, target: &Axis, device_count: usize) -> Result<Vec<Axes>> {
    if device_count == 0 {
        return Err(TensorError::ZeroDevices);
    }
    (0..device_count)
        .map(|i| {
            axes.iter()
                .map(|a| {
                    if a == target {
                        let (start, stop) = shard_bounds(a.length(), device_count, i)?;
                        Ok(a.with_length(stop - start))
                    } else {
                        Ok(a.clone())
                    }
                })
                .collect::<Result<Vec<_>>>()
                .map(Axes::new)
        })
        .collect()
}

/// Per-device slices into the original axes when `target` is split across
/// `device_count` devices.
///
/// Returns one slice sequence per device (one `Slice` per axis). Axes other
/// than `target` get the identity slice.
pub fn partition_slices(axes: &Axes, target: &Axis, device_count: usize) -> Result<Vec<Vec<Slice>>> {
    if device_count == 0 {
        return Err(TensorError::ZeroDevices);
    }
    (0..device_count)
        .map(|i| {
            axes.iter()
                .map(|a| {
                    if a == target {
                        let (start, stop) = shard_bounds(a.length(), device_count, i)?;
                        Ok(Slice::new(start, stop, 1))
                    } else {
                        Ok(Slice::full(a.length()))
                    }
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}
