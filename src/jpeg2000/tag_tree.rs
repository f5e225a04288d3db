use log::trace;

use crate::constants::TAG_TREE_UNKNOWN;
use crate::error::T2Error;
use crate::jpeg2000::bit_io::{J2kBitReader, J2kBitWriter};

/// Tag Tree for JPEG 2000 Packet Header coding (B.10.2).
///
/// Represents a quad-tree over a 2D grid of non-negative integers (code-block inclusion
/// layers, number of insignificant bit-planes). Every node records the minimum of the
/// nodes below it, and values are revealed incrementally against growing thresholds.
///
/// All levels live in one flat `nodes` vector: the leaves first in raster order, then each
/// reduced level, the root last. Nodes only link upwards through `parent_index`.
#[derive(Clone, Debug)]
pub struct TagTree {
    nodes: Vec<TagTreeNode>,
    leaf_width: usize,
    leaf_height: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TagTreeNode {
    value: u32,
    low: u32,
    known: bool,
    parent_index: Option<usize>,
}

impl Default for TagTreeNode {
    fn default() -> Self {
        Self {
            value: TAG_TREE_UNKNOWN,
            low: 0,
            known: false,
            parent_index: None,
        }
    }
}

impl TagTree {
    /// Create a new TagTree for a grid of `w` x `h` leaves.
    pub fn new(w: usize, h: usize) -> Result<Self, T2Error> {
        if w == 0 || h == 0 {
            return Err(T2Error::InvalidArgument);
        }

        // Level sizes from the leaves up to the 1x1 root.
        let mut level_sizes = vec![(w, h)];
        let mut total = w.checked_mul(h).ok_or(T2Error::NotEnoughMemory)?;
        let (mut current_w, mut current_h) = (w, h);
        while current_w > 1 || current_h > 1 {
            current_w = current_w.div_ceil(2);
            current_h = current_h.div_ceil(2);
            level_sizes.push((current_w, current_h));
            total += current_w * current_h;
        }

        let mut nodes = Vec::new();
        nodes
            .try_reserve_exact(total)
            .map_err(|_| T2Error::NotEnoughMemory)?;
        nodes.resize(total, TagTreeNode::default());

        // Link every node of a level to its parent in the next one. Children come in pairs
        // along a row; two consecutive rows share a row of parents.
        let mut level_start = 0;
        for pair in level_sizes.windows(2) {
            let (lw, lh) = pair[0];
            let (pw, _) = pair[1];
            let parent_start = level_start + lw * lh;
            for y in 0..lh {
                for x in 0..lw {
                    nodes[level_start + y * lw + x].parent_index =
                        Some(parent_start + (y / 2) * pw + x / 2);
                }
            }
            level_start = parent_start;
        }

        Ok(Self {
            nodes,
            leaf_width: w,
            leaf_height: h,
        })
    }

    pub fn leaf_width(&self) -> usize {
        self.leaf_width
    }

    pub fn leaf_height(&self) -> usize {
        self.leaf_height
    }

    pub fn num_leaves(&self) -> usize {
        self.leaf_width * self.leaf_height
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Index of the leaf at grid coordinate (x, y).
    pub fn leaf_index(&self, x: usize, y: usize) -> Result<usize, T2Error> {
        if x >= self.leaf_width || y >= self.leaf_height {
            return Err(T2Error::InvalidTagTreeLeaf);
        }
        Ok(y * self.leaf_width + x)
    }

    fn check_leaf(&self, leaf: usize) -> Result<(), T2Error> {
        if leaf >= self.num_leaves() {
            return Err(T2Error::InvalidTagTreeLeaf);
        }
        Ok(())
    }

    /// Reset the tree state (values, lower bounds and known status).
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.value = TAG_TREE_UNKNOWN;
            node.low = 0;
            node.known = false;
        }
    }

    /// Copy the coding state of `src` into this tree. Both trees must have the same shape.
    pub fn copy_from(&mut self, src: &TagTree) -> Result<(), T2Error> {
        if self.leaf_width != src.leaf_width || self.leaf_height != src.leaf_height {
            return Err(T2Error::TagTreeSizeMismatch);
        }
        for (dst, src) in self.nodes.iter_mut().zip(&src.nodes) {
            dst.value = src.value;
            dst.low = src.low;
            dst.known = src.known;
        }
        Ok(())
    }

    /// Current value recorded at a leaf. `TAG_TREE_UNKNOWN` until set or decoded.
    pub fn value(&self, leaf: usize) -> Result<u32, T2Error> {
        self.check_leaf(leaf)?;
        Ok(self.nodes[leaf].value)
    }

    /// Set the value of a leaf, lowering every ancestor that holds a larger value.
    pub fn set_value(&mut self, leaf: usize, value: u32) -> Result<(), T2Error> {
        self.check_leaf(leaf)?;
        let mut idx = Some(leaf);
        while let Some(i) = idx {
            let node = &mut self.nodes[i];
            if node.value <= value {
                break;
            }
            node.value = value;
            idx = node.parent_index;
        }
        Ok(())
    }

    /// Path from the root down to `leaf`, root first.
    fn path(&self, leaf: usize) -> Vec<usize> {
        let mut stack = Vec::new();
        let mut idx = Some(leaf);
        while let Some(i) = idx {
            stack.push(i);
            idx = self.nodes[i].parent_index;
        }
        stack.reverse();
        stack
    }

    /// Encode the value of `leaf` against `threshold`.
    ///
    /// Returns `true` when the leaf value is known to be below the threshold.
    pub fn encode(
        &mut self,
        writer: &mut J2kBitWriter,
        leaf: usize,
        threshold: u32,
    ) -> Result<bool, T2Error> {
        self.check_leaf(leaf)?;

        let mut low = 0;
        for idx in self.path(leaf) {
            let node = &mut self.nodes[idx];
            // A bound already established at this node never moves back down.
            if low > node.low {
                node.low = low;
            } else {
                low = node.low;
            }

            while low < threshold {
                if low >= node.value {
                    if !node.known {
                        writer.write_bit(1)?;
                        node.known = true;
                    }
                    break;
                }
                writer.write_bit(0)?;
                low += 1;
            }
            node.low = low;
        }

        let included = self.nodes[leaf].low < threshold;
        trace!("tag tree encode leaf {leaf} threshold {threshold} -> {included}");
        Ok(included)
    }

    /// Decode the tag tree for `leaf` up to `threshold`.
    ///
    /// Returns `true` when the decoded leaf value is below the threshold; the value is then
    /// available through [`TagTree::value`].
    pub fn decode(
        &mut self,
        reader: &mut J2kBitReader,
        leaf: usize,
        threshold: u32,
    ) -> Result<bool, T2Error> {
        self.check_leaf(leaf)?;

        let mut low = 0;
        for idx in self.path(leaf) {
            let node = &mut self.nodes[idx];
            if low > node.low {
                node.low = low;
            } else {
                low = node.low;
            }

            while low < threshold && low < node.value {
                if reader.read_bit()? == 1 {
                    node.value = low;
                } else {
                    low += 1;
                }
            }
            node.low = low;
        }

        Ok(self.nodes[leaf].value < threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bits(data: &[u8], count: usize) -> Vec<u8> {
        let mut reader = J2kBitReader::new(data);
        (0..count).map(|_| reader.read_bit().unwrap()).collect()
    }

    #[test]
    fn test_tag_tree_structure() {
        let tt = TagTree::new(3, 3).unwrap();
        assert_eq!(tt.nodes.len(), 14);

        let leaf0 = &tt.nodes[0];
        assert_eq!(leaf0.parent_index, Some(9));

        let leaf8 = &tt.nodes[8];
        assert_eq!(leaf8.parent_index, Some(12));

        assert_eq!(tt.nodes[12].parent_index, Some(13));
        assert_eq!(tt.nodes[13].parent_index, None);
    }

    #[test]
    fn test_odd_row_structure() {
        // 5x1: levels of 5, 3, 2 and 1 nodes.
        let tt = TagTree::new(5, 1).unwrap();
        assert_eq!(tt.num_nodes(), 11);
        assert_eq!(tt.nodes[4].parent_index, Some(7));
        assert_eq!(tt.nodes[7].parent_index, Some(9));
        assert_eq!(tt.nodes[9].parent_index, Some(10));
    }

    #[test]
    fn test_rejects_empty_grid() {
        assert_eq!(TagTree::new(0, 4).err(), Some(T2Error::InvalidArgument));
    }

    #[test]
    fn test_set_value_propagates_minimum() {
        let mut tt = TagTree::new(2, 2).unwrap();
        tt.reset();
        tt.set_value(0, 5).unwrap();
        tt.set_value(3, 2).unwrap();
        tt.set_value(1, 7).unwrap();
        assert_eq!(tt.nodes[4].value, 2);
        assert_eq!(tt.value(1).unwrap(), 7);
        assert_eq!(tt.set_value(4, 1), Err(T2Error::InvalidTagTreeLeaf));
    }

    #[test]
    fn test_single_leaf_bits() {
        let mut tt = TagTree::new(1, 1).unwrap();
        tt.set_value(0, 3).unwrap();

        let mut writer = J2kBitWriter::new();
        assert!(!tt.encode(&mut writer, 0, 2).unwrap());
        assert!(tt.encode(&mut writer, 0, 5).unwrap());
        // Already known: no more bits.
        assert!(tt.encode(&mut writer, 0, 6).unwrap());
        let data = writer.finish().unwrap();
        assert_eq!(bits(&data, 4), vec![0, 0, 0, 1]);

        let mut tt_dec = TagTree::new(1, 1).unwrap();
        let mut reader = J2kBitReader::new(&data);
        assert!(!tt_dec.decode(&mut reader, 0, 2).unwrap());
        assert!(tt_dec.decode(&mut reader, 0, 5).unwrap());
        assert_eq!(tt_dec.value(0).unwrap(), 3);
    }

    #[test]
    fn test_tag_tree_roundtrip() {
        let values = [5u32, 2, 10, 0, 1, 3];
        let mut tt_enc = TagTree::new(3, 2).unwrap();
        for (leaf, &v) in values.iter().enumerate() {
            tt_enc.set_value(leaf, v).unwrap();
        }

        let mut writer = J2kBitWriter::new();
        let mut expected = Vec::new();
        for threshold in [1u32, 4, 11] {
            for leaf in 0..values.len() {
                expected.push(tt_enc.encode(&mut writer, leaf, threshold).unwrap());
            }
        }
        let buffer = writer.finish().unwrap();

        let mut tt_dec = TagTree::new(3, 2).unwrap();
        let mut reader = J2kBitReader::new(&buffer);
        let mut decoded = Vec::new();
        for threshold in [1u32, 4, 11] {
            for leaf in 0..values.len() {
                decoded.push(tt_dec.decode(&mut reader, leaf, threshold).unwrap());
            }
        }
        assert_eq!(expected, decoded);
        for (leaf, &v) in values.iter().enumerate() {
            assert_eq!(tt_dec.value(leaf).unwrap(), v);
        }
    }

    #[test]
    fn test_copy_restores_state() {
        let mut tt = TagTree::new(2, 1).unwrap();
        tt.set_value(0, 1).unwrap();
        tt.set_value(1, 4).unwrap();
        let saved = tt.clone();

        let mut writer = J2kBitWriter::new();
        tt.encode(&mut writer, 1, 5).unwrap();
        assert_ne!(tt.nodes, saved.nodes);

        tt.copy_from(&saved).unwrap();
        assert_eq!(tt.nodes, saved.nodes);

        let other = TagTree::new(1, 2).unwrap();
        assert_eq!(tt.copy_from(&other), Err(T2Error::TagTreeSizeMismatch));
    }

    #[test]
    fn test_decode_end_of_stream() {
        let mut tt = TagTree::new(1, 1).unwrap();
        let mut reader = J2kBitReader::new(&[]);
        assert_eq!(tt.decode(&mut reader, 0, 1), Err(T2Error::EndOfStream));
    }

    proptest! {
        /// Every node holds the minimum of the values set on the leaves below it.
        #[test]
        fn prop_set_value_keeps_subtree_minimum(
            w in 1usize..7,
            h in 1usize..7,
            updates in prop::collection::vec((0usize..49, 0u32..20), 0..40)
        ) {
            let mut tt = TagTree::new(w, h).unwrap();
            let mut leaf_min = vec![TAG_TREE_UNKNOWN; w * h];
            for (leaf, value) in updates {
                let leaf = leaf % (w * h);
                tt.set_value(leaf, value).unwrap();
                leaf_min[leaf] = leaf_min[leaf].min(value);
            }

            let mut expected = vec![TAG_TREE_UNKNOWN; tt.num_nodes()];
            for (leaf, &value) in leaf_min.iter().enumerate() {
                let mut idx = Some(leaf);
                while let Some(i) = idx {
                    expected[i] = expected[i].min(value);
                    idx = tt.nodes[i].parent_index;
                }
            }
            for (node, &value) in tt.nodes.iter().zip(&expected) {
                prop_assert_eq!(node.value, value);
            }
        }
    }
}
