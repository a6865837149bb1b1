//! Property tests over randomly placed vertices.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;

use fibrelink_engine::constraint::ShortestGap;
use fibrelink_engine::{
    AxisLocation, CancellationToken, ConnectConfig, ConstraintPolicy, FastConstraints,
    FilamentEdge, FilamentGraph, MaskVolume, Point3, Reconnector, SpatialVertex,
    ThoroughConstraints, ValueRange,
};
use image::{GrayImage, Luma};
use proptest::prelude::*;

/// `(x, y, z, frame)` on a small integer grid so that ties and coincident
/// distances actually occur.
fn vertices() -> impl Strategy<Value = Vec<(u8, u8, u8, i32)>> {
    prop::collection::vec((0u8..24, 0u8..24, 0u8..3, 0i32..2), 0..24)
}

/// Pairs of vertex indices to pre-connect; out-of-range and repeated pairs
/// are skipped when building.
fn chains() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..24, 0usize..24), 0..12)
}

fn build(points: &[(u8, u8, u8, i32)], edges: &[(usize, usize)]) -> FilamentGraph {
    let mut g = FilamentGraph::new();
    let ids: Vec<_> = points
        .iter()
        .map(|&(x, y, z, frame)| {
            g.add_vertex(
                SpatialVertex::new(Point3::new(f64::from(x), f64::from(y), f64::from(z)))
                    .with_axis(AxisLocation::new(0, frame)),
            )
        })
        .collect();
    for &(a, b) in edges {
        if let (Some(&a), Some(&b)) = (ids.get(a), ids.get(b)) {
            // Self-loops and duplicates are rejected; that is fine here.
            let _ = g.add_edge(a, b, FilamentEdge::default());
        }
    }
    g
}

fn fast(max_length: f64, ignore_if_has_path: bool) -> ConstraintPolicy {
    ConstraintPolicy::Fast(FastConstraints {
        length_range: ValueRange::new(0.0, max_length),
        degree_range: ValueRange::new(0, 3),
        ignore_if_has_path,
        ..FastConstraints::default()
    })
}

fn endpoint_gap() -> ConstraintPolicy {
    ConstraintPolicy::Thorough(
        ThoroughConstraints::new(fibrelink_engine::constraint::EndpointGap { max_length: 12.0 })
            .with_scorer(ShortestGap),
    )
}

fn edge_set(g: &FilamentGraph) -> HashSet<(usize, usize)> {
    g.edges()
        .map(|(a, b, _)| {
            let (a, b) = (a.index(), b.index());
            (a.min(b), a.max(b))
        })
        .collect()
}

proptest! {
    #[test]
    fn degree_limit_is_respected(
        points in vertices(),
        edges in chains(),
        limit in 1u32..4,
        thorough in any::<bool>(),
    ) {
        let mut g = build(&points, &edges);
        let before: Vec<usize> = g.vertex_ids().map(|v| g.degree_of(v)).collect();
        let config = ConnectConfig {
            limit_connections: Some(limit),
            connect_across_frames: true,
            ..ConnectConfig::default()
        };
        let policy = if thorough { endpoint_gap() } else { fast(12.0, false) };
        let outcome = Reconnector::new(config, policy)
            .unwrap()
            .run(&mut g, None, &CancellationToken::new());
        let mut added_total = 0;
        for (v, old) in g.vertex_ids().zip(before) {
            let added = g.degree_of(v) - old;
            prop_assert!(added <= limit as usize, "vertex {v:?} gained {added} edges");
            added_total += added;
        }
        prop_assert_eq!(added_total, 2 * outcome.created);
    }

    #[test]
    fn no_self_loops_or_parallel_edges(
        points in vertices(),
        edges in chains(),
        thorough in any::<bool>(),
    ) {
        let mut g = build(&points, &edges);
        let original = edge_set(&g);
        let policy = if thorough { endpoint_gap() } else { fast(8.0, false) };
        let outcome = Reconnector::new(ConnectConfig::default(), policy)
            .unwrap()
            .run(&mut g, None, &CancellationToken::new());
        let after = edge_set(&g);
        prop_assert_eq!(after.len(), g.edge_count());
        prop_assert!(after.iter().all(|(a, b)| a != b));
        prop_assert!(original.is_subset(&after));
        prop_assert_eq!(after.len() - original.len(), outcome.created);
    }

    #[test]
    fn fast_filters_are_symmetric(
        points in vertices(),
        edges in chains(),
        enable_3d in any::<bool>(),
        across_frames in any::<bool>(),
        ignore_if_has_path in any::<bool>(),
    ) {
        // Without a mask every fast filter is order-independent, so each
        // accepted pair was accepted in both orientations and exactly one
        // of the two was dropped as a duplicate.
        let mut g = build(&points, &edges);
        let config = ConnectConfig {
            enable_3d,
            connect_across_frames: across_frames,
            ..ConnectConfig::default()
        };
        let outcome = Reconnector::new(config, fast(10.0, ignore_if_has_path))
            .unwrap()
            .run_with_diagnostics(
                &mut g,
                None,
                &CancellationToken::new(),
                &fibrelink_engine::diagnostics::NullClock,
            )
            .1;
        if let fibrelink_engine::diagnostics::StageMetrics::Generation {
            candidate_count,
            duplicates_removed,
            ..
        } = outcome.generation.metrics
        {
            prop_assert_eq!(candidate_count, duplicates_removed);
        } else {
            prop_assert!(false, "generation metrics missing");
        }
    }

    #[test]
    fn full_mask_changes_nothing(
        points in vertices(),
        edges in chains(),
        thorough in any::<bool>(),
    ) {
        let g = build(&points, &edges);
        let mask = MaskVolume::new(vec![GrayImage::from_pixel(24, 24, Luma([1])); 3]).unwrap();
        let policy = || if thorough { endpoint_gap() } else { fast(10.0, true) };
        let cancel = CancellationToken::new();
        let (without, a) = Reconnector::new(ConnectConfig::default(), policy())
            .unwrap()
            .run_on_copy(&g, None, &cancel);
        let (with, b) = Reconnector::new(ConnectConfig::default(), policy())
            .unwrap()
            .run_on_copy(&g, Some(&mask), &cancel);
        prop_assert_eq!(a.candidate_count, b.candidate_count);
        prop_assert_eq!(b.rejections.mask, 0);
        prop_assert_eq!(edge_set(&without), edge_set(&with));
    }
}
