//! Property-based tests for packet progression over random tile geometries.

use std::collections::HashSet;

use proptest::prelude::*;

use jpc_t2::{
    ComponentParams, J2kTile, PacketIterator, PacketPosition, ProgressionChange,
    ProgressionChangeList, ProgressionOrder, TileParams,
};

fn order() -> impl Strategy<Value = ProgressionOrder> {
    prop::sample::select(ProgressionOrder::ALL.to_vec())
}

fn component() -> impl Strategy<Value = ComponentParams> {
    let sampling = prop::sample::select(vec![1u32, 2, 4]);
    (sampling.clone(), sampling, 0u32..=3, 2u32..=4).prop_flat_map(|(dx, dy, levels, cblk)| {
        prop::collection::vec((2u32..=6, 2u32..=6), levels as usize + 1).prop_map(
            move |precinct_exps| ComponentParams {
                dx,
                dy,
                decomposition_levels: levels,
                codeblock_width_exp: cblk,
                codeblock_height_exp: cblk,
                precinct_exps,
                ..ComponentParams::default()
            },
        )
    })
}

/// A change volume inside the tile bounds: (order, RS, CS, LYE, RE, CE) as fractions.
fn change() -> impl Strategy<Value = (ProgressionOrder, usize, usize, usize, usize, usize)> {
    (order(), 0usize..4, 0usize..3, 1usize..=3, 1usize..=4, 1usize..=3)
}

fn tile_params() -> impl Strategy<Value = TileParams> {
    (
        0u32..40,
        0u32..40,
        1u32..64,
        1u32..64,
        prop::collection::vec(component(), 1..=3),
        1usize..=3,
        order(),
        prop::option::of(change()),
    )
        .prop_map(|(x0, y0, w, h, components, num_layers, order, change)| {
            let mut progression_changes = ProgressionChangeList::new();
            if let Some((change_order, rs, cs, lye, re, ce)) = change {
                let max_res = components
                    .iter()
                    .map(|c| c.decomposition_levels as usize + 1)
                    .max()
                    .unwrap_or(1);
                let resolution_start = rs.min(max_res - 1);
                let component_start = cs.min(components.len() - 1);
                progression_changes
                    .push(ProgressionChange {
                        order: change_order,
                        resolution_start,
                        component_start,
                        layer_end: lye.min(num_layers),
                        resolution_end: (resolution_start + re).min(max_res),
                        component_end: (component_start + ce).min(components.len()),
                    })
                    .unwrap();
            }
            TileParams {
                x0,
                y0,
                x1: x0 + w,
                y1: y0 + h,
                num_layers,
                progression_order: order,
                progression_changes,
                components,
                ..TileParams::default()
            }
        })
}

fn every_packet(tile: &J2kTile) -> HashSet<PacketPosition> {
    let mut all = HashSet::new();
    for (component, comp) in tile.components.iter().enumerate() {
        for (resolution, res) in comp.resolutions.iter().enumerate() {
            for precinct in 0..res.num_precincts() {
                for layer in 0..tile.num_layers {
                    all.insert(PacketPosition {
                        component,
                        resolution,
                        precinct,
                        layer,
                    });
                }
            }
        }
    }
    all
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every packet of the tile is produced exactly once.
    #[test]
    fn progression_is_complete(params in tile_params()) {
        let tile = J2kTile::new(&params).unwrap();
        let sequence: Vec<_> = PacketIterator::for_tile(&tile).unwrap().collect();

        let unique: HashSet<_> = sequence.iter().copied().collect();
        prop_assert_eq!(unique.len(), sequence.len());
        prop_assert_eq!(sequence.len(), tile.num_packets());
        prop_assert_eq!(unique, every_packet(&tile));
    }

    /// Layers of one precinct come out in increasing order.
    #[test]
    fn layers_follow_each_other(params in tile_params()) {
        let tile = J2kTile::new(&params).unwrap();
        let mut next_layer = std::collections::HashMap::new();
        for position in PacketIterator::for_tile(&tile).unwrap() {
            let key = (position.component, position.resolution, position.precinct);
            let expected = next_layer.entry(key).or_insert(0usize);
            prop_assert_eq!(position.layer, *expected);
            *expected += 1;
        }
    }

    /// Two iterators over the same tile, or one rewound, agree packet for packet.
    #[test]
    fn progression_is_deterministic(params in tile_params()) {
        let tile = J2kTile::new(&params).unwrap();
        let first: Vec<_> = PacketIterator::for_tile(&tile).unwrap().collect();
        let second: Vec<_> = PacketIterator::for_tile(&tile).unwrap().collect();
        prop_assert_eq!(&first, &second);

        let mut pi = PacketIterator::for_tile(&tile).unwrap();
        let partial = first.len() / 2;
        for _ in 0..partial {
            pi.next_packet();
        }
        pi.init();
        prop_assert_eq!(pi.packet_number(), None);
        let rewound: Vec<_> = pi.by_ref().collect();
        prop_assert_eq!(&rewound, &first);
    }

    #[test]
    fn packet_numbers_count_from_zero(params in tile_params()) {
        let tile = J2kTile::new(&params).unwrap();
        let mut pi = PacketIterator::for_tile(&tile).unwrap();
        let mut expected = 0;
        while let Some(position) = pi.next_packet() {
            prop_assert_eq!(pi.packet_number(), Some(expected));
            prop_assert_eq!(pi.position(), Some(position));
            expected += 1;
        }
        prop_assert_eq!(expected, tile.num_packets());
    }
}

#[test]
fn lrcp_single_resolution_two_layers() {
    let params = TileParams {
        x1: 64,
        y1: 64,
        num_layers: 2,
        components: vec![ComponentParams {
            decomposition_levels: 0,
            precinct_exps: vec![(5, 5)],
            ..ComponentParams::default()
        }],
        ..TileParams::default()
    };
    let tile = J2kTile::new(&params).unwrap();
    let sequence: Vec<_> = PacketIterator::for_tile(&tile)
        .unwrap()
        .map(|p| (p.layer, p.precinct))
        .collect();
    assert_eq!(
        sequence,
        vec![(0, 0), (0, 1), (0, 2), (0, 3), (1, 0), (1, 1), (1, 2), (1, 3)]
    );
}

#[test]
fn change_volume_then_default() {
    // One resolution-first volume over layer 0, then the LRCP default for the rest.
    let mut changes = ProgressionChangeList::new();
    changes
        .push("RLCP:0:0:1:2:1".parse().unwrap())
        .unwrap();
    let params = TileParams {
        x1: 16,
        y1: 16,
        num_layers: 2,
        progression_changes: changes,
        components: vec![ComponentParams {
            decomposition_levels: 1,
            precinct_exps: vec![(3, 3), (3, 3)],
            ..ComponentParams::default()
        }],
        ..TileParams::default()
    };
    let tile = J2kTile::new(&params).unwrap();
    let sequence: Vec<_> = PacketIterator::for_tile(&tile).unwrap().collect();
    assert_eq!(sequence.len(), 10);
    assert!(sequence[..5].iter().all(|p| p.layer == 0));
    assert!(sequence[5..].iter().all(|p| p.layer == 1));
}
