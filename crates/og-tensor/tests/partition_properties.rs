//! Property-based tests for axis partitioning.
//!
//! Covers length preservation, remainder placement, gap-free slice coverage,
//! and reassembly of a tensor from its per-device shards.

use og_tensor::{partition_axes, partition_slices, Axes, Axis, DType, Slice, Tensor};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────────

/// An axis length and a device count, including splits with more devices than elements.
fn arb_split() -> impl Strategy<Value = (usize, usize)> {
    (0usize..=200, 1usize..=16)
}

fn split_axes(length: usize) -> (Axes, Axis) {
    let target = Axis::new("N", length);
    let axes = Axes::new(vec![Axis::new("C", 3), target.clone(), Axis::new("K", 2)]);
    (axes, target)
}

// ── Property tests ───────────────────────────────────────────────────────────

proptest! {
    /// Per-device lengths sum to the original length; only the last device is larger.
    #[test]
    fn lengths_sum_to_original((length, devices) in arb_split()) {
        let (axes, target) = split_axes(length);
        let per_device = partition_axes(&axes, &target, devices).unwrap();
        prop_assert_eq!(per_device.len(), devices);

        let lengths: Vec<usize> = per_device.iter().map(|a| a.get(1).unwrap().length()).collect();
        prop_assert_eq!(lengths.iter().sum::<usize>(), length);
        for &l in &lengths[..devices - 1] {
            prop_assert_eq!(l, length / devices);
        }
        prop_assert_eq!(lengths[devices - 1], length / devices + length % devices);

        // Only the target axis changes.
        for a in &per_device {
            prop_assert_eq!(a.get(0), axes.get(0));
            prop_assert_eq!(a.get(2), axes.get(2));
        }
    }

    /// Concatenating the slices in device order covers [0, length) with no gaps or overlaps.
    #[test]
    fn slices_tile_the_axis((length, devices) in arb_split()) {
        let (axes, target) = split_axes(length);
        let slices = partition_slices(&axes, &target, devices).unwrap();
        prop_assert_eq!(slices.len(), devices);

        let mut cursor = 0;
        for per_device in &slices {
            let s = per_device[1];
            prop_assert_eq!(s.step, 1);
            prop_assert_eq!(s.start, cursor);
            cursor = s.stop;
            prop_assert_eq!(per_device[0], Slice::full(3));
            prop_assert_eq!(per_device[2], Slice::full(2));
        }
        prop_assert_eq!(cursor, length);
    }

    /// Slice lengths agree with the partitioned axis lengths for every device.
    #[test]
    fn slices_match_axes((length, devices) in arb_split()) {
        let (axes, target) = split_axes(length);
        let per_device = partition_axes(&axes, &target, devices).unwrap();
        let slices = partition_slices(&axes, &target, devices).unwrap();
        for (a, s) in per_device.iter().zip(&slices) {
            let from_slices: Vec<usize> = s.iter().map(Slice::len).collect();
            prop_assert_eq!(a.lengths(), from_slices);
        }
    }

    /// Scattering a tensor into shards and gathering them back restores it exactly.
    #[test]
    fn scatter_then_gather_restores_tensor(length in 0usize..=24, devices in 1usize..=6) {
        let (axes, target) = split_axes(length);
        let data: Vec<i32> = (0..axes.numel() as i32).collect();
        let original = Tensor::new(data, axes.clone()).unwrap();

        let slices = partition_slices(&axes, &target, devices).unwrap();
        let shards: Vec<Tensor> = slices.iter().map(|s| original.slice(s).unwrap()).collect();

        let mut rebuilt = Tensor::zeros(axes, DType::I32);
        for (s, shard) in slices.iter().zip(&shards) {
            rebuilt.assign(s, shard).unwrap();
        }
        prop_assert_eq!(rebuilt, original);
    }
}
