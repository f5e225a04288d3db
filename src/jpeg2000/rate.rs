//! Layer formation by rate-distortion slope thresholds.

use log::debug;

use crate::error::T2Error;
use crate::jpeg2000::bit_io::J2kBitWriter;
use crate::jpeg2000::encoder::Tier2Encoder;

const SLOPE_SEARCH_ITERATIONS: usize = 32;

impl Tier2Encoder {
    /// Assign coding passes to layers so that the packets of layers `0..=l` fit in
    /// `budgets[l]` bytes. A `None` budget takes every pass still unassigned.
    ///
    /// Each budgeted layer binary-searches the smallest slope threshold whose packets fit:
    /// trial encodings run on a saved state which is restored afterwards. The coding
    /// state is reset on return; the chosen threshold of every layer is returned.
    pub fn allocate_layers(&mut self, budgets: &[Option<usize>]) -> Result<Vec<f64>, T2Error> {
        if budgets.len() != self.tile.num_layers {
            return Err(T2Error::InvalidArgument);
        }
        self.init_state(true)?;

        let mut committed = J2kBitWriter::new();
        let mut thresholds = Vec::with_capacity(budgets.len());
        for (layer, budget) in budgets.iter().enumerate() {
            let threshold = match budget {
                None => f64::NEG_INFINITY,
                Some(budget) => self.search_threshold(layer, *budget, committed.len())?,
            };
            self.assign_passes(layer, threshold);
            self.encode_layer(layer, &mut committed)?;
            debug!(
                "layer {layer}: slope threshold {threshold}, {} bytes total",
                committed.len()
            );
            thresholds.push(threshold);
        }

        self.init_state(false)?;
        Ok(thresholds)
    }

    fn search_threshold(&mut self, layer: usize, budget: usize, used: usize) -> Result<f64, T2Error> {
        let (mut low, mut high) = self.slope_range();
        if low > high {
            return Ok(f64::INFINITY);
        }

        // Everything that is left may already fit.
        if self.trial_size(layer, low)? + used <= budget {
            return Ok(low);
        }
        let mut best = f64::INFINITY;
        for _ in 0..SLOPE_SEARCH_ITERATIONS {
            let middle = low + (high - low) / 2.0;
            if self.trial_size(layer, middle)? + used <= budget {
                best = middle;
                high = middle;
            } else {
                low = middle;
            }
        }
        // The upper end only adds passes of the steepest slope.
        if best.is_infinite() && self.trial_size(layer, high)? + used <= budget {
            best = high;
        }
        Ok(best)
    }

    /// Bytes produced by the packets of `layer` when passes down to `threshold` are sent.
    fn trial_size(&mut self, layer: usize, threshold: f64) -> Result<usize, T2Error> {
        self.assign_passes(layer, threshold);
        let snapshot = self.save_state();
        let mut scratch = J2kBitWriter::new();
        self.encode_layer(layer, &mut scratch)?;
        let size = scratch.finish()?.len();
        self.restore_state(&snapshot)?;
        self.unassign_passes(layer);
        Ok(size)
    }

    /// Smallest and largest positive slope among passes not yet assigned.
    fn slope_range(&self) -> (f64, f64) {
        let mut low = f64::INFINITY;
        let mut high = f64::NEG_INFINITY;
        for cblk in self.tile.codeblocks() {
            for pass in cblk.passes.iter().filter(|p| p.layer.is_none() && p.rd_slope > 0.0) {
                low = low.min(pass.rd_slope);
                high = high.max(pass.rd_slope);
            }
        }
        (low, high)
    }

    /// Give `layer` every unassigned pass up to the last one with a slope of at least
    /// `threshold`.
    fn assign_passes(&mut self, layer: usize, threshold: f64) {
        for cblk in self.tile.codeblocks_mut() {
            let first = cblk
                .passes
                .iter()
                .position(|p| p.layer.is_none())
                .unwrap_or(cblk.passes.len());
            let last = cblk.passes[first..]
                .iter()
                .rposition(|p| threshold == f64::NEG_INFINITY || p.rd_slope >= threshold);
            if let Some(last) = last {
                for pass in &mut cblk.passes[first..=first + last] {
                    pass.layer = Some(layer);
                }
            }
        }
    }

    fn unassign_passes(&mut self, layer: usize) {
        for cblk in self.tile.codeblocks_mut() {
            for pass in cblk.passes.iter_mut().filter(|p| p.layer == Some(layer)) {
                pass.layer = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::jpeg2000::bit_io::J2kBitWriter;
    use crate::jpeg2000::encoder::Tier2Encoder;
    use crate::jpeg2000::image::{CodingPass, ComponentParams, J2kTile, TileParams};

    /// 8x4 tile with two 4x4 code-blocks of four passes each.
    fn encoder(num_layers: usize) -> Tier2Encoder {
        let params = TileParams {
            x1: 8,
            y1: 4,
            num_layers,
            components: vec![ComponentParams {
                decomposition_levels: 0,
                codeblock_width_exp: 2,
                codeblock_height_exp: 2,
                ..ComponentParams::default()
            }],
            ..TileParams::default()
        };
        let mut tile = J2kTile::new(&params).unwrap();
        let band = &mut tile.components[0].resolutions[0].subbands[0];
        band.num_bitplanes = 2;
        for (b, cblk) in band.precincts[0].codeblocks.iter_mut().enumerate() {
            cblk.num_bitplanes = 2;
            let mut offset = 0;
            for i in 0..4 {
                let len = 10 + 5 * b;
                cblk.passes.push(CodingPass {
                    start: offset,
                    end: offset + len,
                    terminated: i == 3,
                    layer: None,
                    rd_slope: (100 - 20 * i - 5 * b) as f64,
                });
                offset += len;
            }
            cblk.data = vec![0xA5; offset];
        }
        Tier2Encoder::new(tile).unwrap()
    }

    fn layers(encoder: &Tier2Encoder) -> Vec<Vec<Option<usize>>> {
        encoder
            .tile()
            .codeblocks()
            .map(|c| c.passes.iter().map(|p| p.layer).collect())
            .collect()
    }

    #[test]
    fn test_unbounded_layer_takes_everything() {
        let mut encoder = encoder(1);
        encoder.allocate_layers(&[None]).unwrap();
        assert!(layers(&encoder).iter().flatten().all(|l| *l == Some(0)));
    }

    #[test]
    fn test_budget_is_respected() {
        let mut encoder = encoder(2);
        encoder.allocate_layers(&[Some(40), None]).unwrap();

        let assignment = layers(&encoder);
        assert!(assignment.iter().flatten().all(|l| l.is_some()));
        let first_layer: usize = assignment
            .iter()
            .flatten()
            .filter(|l| **l == Some(0))
            .count();
        assert!(first_layer > 0);
        assert!(first_layer < 8);
        // Passes stay in order: layers never decrease along a code-block.
        for passes in &assignment {
            assert!(passes.windows(2).all(|w| w[0] <= w[1]));
        }

        let mut first = J2kBitWriter::new();
        encoder.encode_layer(0, &mut first).unwrap();
        assert!(first.finish().unwrap().len() <= 40);
    }

    #[test]
    fn test_tiny_budget_leaves_layer_empty() {
        let mut encoder = encoder(2);
        encoder.allocate_layers(&[Some(1), None]).unwrap();
        assert!(layers(&encoder).iter().flatten().all(|l| *l == Some(1)));
    }
}
