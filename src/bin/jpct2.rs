//! jpct2 CLI - JPEG 2000 Tier-2 packet coding utility.
//!
//! Prints packet progressions for a tile geometry and runs packet encode/decode round
//! trips over synthetic coding-pass data.

use clap::{Args, Parser, Subcommand};

use jpc_t2::jpeg2000::packet::is_terminated;
use jpc_t2::{
    CodeBlockStyle, CodingPass, CodingStyle, ComponentParams, J2kBitWriter, J2kTile,
    PacketIterator, ProgressionChange, ProgressionChangeList, ProgressionOrder, Tier2Decoder,
    Tier2Encoder, TileParams,
};

/// JPEG 2000 Tier-2 packet coding: progression orders, packet headers and layers
#[derive(Parser)]
#[command(name = "jpct2")]
#[command(version)]
#[command(about = "JPEG 2000 Tier-2 packet coding utility", long_about = None)]
#[command(after_help = "EXAMPLES:
    jpct2 order -W 64 -H 64 --levels 2 --layers 2 --order rpcl --precinct 4
    jpct2 order -W 32 -H 32 --layers 3 --poc RLCP:0:0:1:6:1
    jpct2 roundtrip -W 128 -H 96 --components 3 --layers 3 --budget 400 --budget 1200 --sop --eph

Set RUST_LOG=debug (or trace) for progression and packet details.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the packet sequence of a tile
    #[command(visible_alias = "o")]
    Order {
        #[command(flatten)]
        geometry: Geometry,
    },

    /// Encode synthetic coding passes into packets and decode them back
    #[command(visible_alias = "r")]
    Roundtrip {
        #[command(flatten)]
        geometry: Geometry,

        /// Cumulative byte budget of the first layers; remaining layers take what is left
        #[arg(long)]
        budget: Vec<usize>,

        /// Insert SOP marker segments before packets
        #[arg(long)]
        sop: bool,

        /// Insert EPH markers after packet headers
        #[arg(long)]
        eph: bool,

        /// Write packet headers to a separate stream (PPM/PPT)
        #[arg(long)]
        packed: bool,

        /// Selective arithmetic coding bypass
        #[arg(long)]
        bypass: bool,

        /// Terminate every coding pass
        #[arg(long)]
        termall: bool,

        /// Seed of the pseudo-random pass data
        #[arg(long, default_value = "1")]
        seed: u64,
    },
}

#[derive(Args)]
struct Geometry {
    /// Tile width on the reference grid
    #[arg(short = 'W', long)]
    width: u32,

    /// Tile height on the reference grid
    #[arg(short = 'H', long)]
    height: u32,

    /// Horizontal tile origin on the reference grid
    #[arg(long, default_value = "0")]
    x0: u32,

    /// Vertical tile origin on the reference grid
    #[arg(long, default_value = "0")]
    y0: u32,

    /// Number of components; components after the first are sub-sampled by --dx/--dy
    #[arg(short = 'n', long, default_value = "1")]
    components: usize,

    /// Sub-sampling of the secondary components
    #[arg(long, default_value = "1")]
    dx: u32,

    #[arg(long, default_value = "1")]
    dy: u32,

    /// Number of decomposition levels
    #[arg(short, long, default_value = "2")]
    levels: u32,

    /// Number of quality layers
    #[arg(short = 'L', long, default_value = "1")]
    layers: usize,

    /// Progression order: LRCP, RLCP, RPCL, PCRL or CPRL
    #[arg(short, long, default_value = "LRCP")]
    order: ProgressionOrder,

    /// Progression order change ORDER:RSpoc:CSpoc:LYEpoc:REpoc:CEpoc, may repeat
    #[arg(long)]
    poc: Vec<ProgressionChange>,

    /// Precinct size exponent for every resolution level
    #[arg(short, long, default_value = "15")]
    precinct: u32,

    /// Code-block size exponent
    #[arg(short, long, default_value = "4")]
    cblk: u32,
}

impl Geometry {
    fn tile_params(
        &self,
        coding_style: CodingStyle,
        codeblock_style: CodeBlockStyle,
    ) -> Result<TileParams, Box<dyn std::error::Error>> {
        let mut progression_changes = ProgressionChangeList::new();
        for change in &self.poc {
            progression_changes.push(*change)?;
        }
        let components = (0..self.components)
            .map(|c| ComponentParams {
                dx: if c == 0 { 1 } else { self.dx },
                dy: if c == 0 { 1 } else { self.dy },
                decomposition_levels: self.levels,
                codeblock_width_exp: self.cblk,
                codeblock_height_exp: self.cblk,
                precinct_exps: vec![(self.precinct, self.precinct); self.levels as usize + 1],
                codeblock_style,
            })
            .collect();
        let x1 = self
            .x0
            .checked_add(self.width)
            .ok_or("tile extends beyond the reference grid")?;
        let y1 = self
            .y0
            .checked_add(self.height)
            .ok_or("tile extends beyond the reference grid")?;
        Ok(TileParams {
            index: 0,
            x0: self.x0,
            y0: self.y0,
            x1,
            y1,
            num_layers: self.layers,
            progression_order: self.order,
            progression_changes,
            coding_style,
            components,
        })
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Order { geometry } => show_order(&geometry),
        Commands::Roundtrip {
            geometry,
            budget,
            sop,
            eph,
            packed,
            bypass,
            termall,
            seed,
        } => roundtrip(
            &geometry,
            &budget,
            CodingStyle {
                use_sop: sop,
                use_eph: eph,
            },
            CodeBlockStyle {
                bypass,
                terminate_all: termall,
            },
            packed,
            seed,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn show_order(geometry: &Geometry) -> Result<(), Box<dyn std::error::Error>> {
    let params = geometry.tile_params(CodingStyle::default(), CodeBlockStyle::default())?;
    let tile = J2kTile::new(&params)?;
    let pi = PacketIterator::for_tile(&tile)?;

    println!("packet  comp  res  prec  layer");
    let mut count = 0;
    for (number, position) in pi.enumerate() {
        println!(
            "{:6}  {:4}  {:3}  {:4}  {:5}",
            number, position.component, position.resolution, position.precinct, position.layer
        );
        count += 1;
    }
    println!("✓ {} packets ({} expected)", count, tile.num_packets());
    Ok(())
}

/// xorshift64 generator for reproducible pass data.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

const BAND_BITPLANES: u32 = 8;

/// Give every code-block pseudo-random coding passes, spread evenly over the layers.
fn fill_passes(tile: &mut J2kTile, rng: &mut XorShift) {
    let num_layers = tile.num_layers;
    for comp in tile.components.iter_mut() {
        let style = comp.codeblock_style;
        for band in comp
            .resolutions
            .iter_mut()
            .flat_map(|r| r.subbands.iter_mut())
        {
            band.num_bitplanes = BAND_BITPLANES;
            for cblk in band.precincts.iter_mut().flat_map(|p| p.codeblocks.iter_mut()) {
                cblk.num_bitplanes = rng.below(BAND_BITPLANES as u64 + 1) as u32;
                let max_passes = (cblk.num_bitplanes * 3).saturating_sub(2) as usize;
                let num_passes = if max_passes == 0 {
                    0
                } else {
                    rng.below(max_passes as u64 + 1) as usize
                };

                let mut offset = 0;
                for i in 0..num_passes {
                    let len = rng.below(24) as usize;
                    cblk.passes.push(CodingPass {
                        start: offset,
                        end: offset + len,
                        terminated: is_terminated(i, 0, num_passes, style),
                        layer: Some(i * num_layers / num_passes),
                        rd_slope: 1000.0 / (i + 1) as f64 + rng.below(10) as f64 / 100.0,
                    });
                    offset += len;
                }
                cblk.data = (0..offset).map(|_| rng.next() as u8).collect();
            }
        }
    }
}

fn roundtrip(
    geometry: &Geometry,
    budgets: &[usize],
    coding_style: CodingStyle,
    codeblock_style: CodeBlockStyle,
    packed: bool,
    seed: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = geometry.tile_params(coding_style, codeblock_style)?;
    let mut tile = J2kTile::new(&params)?;
    let mut rng = XorShift::new(seed);
    fill_passes(&mut tile, &mut rng);

    let mut encoder = Tier2Encoder::new(tile)?;
    if !budgets.is_empty() {
        if budgets.len() > geometry.layers {
            return Err("more budgets than layers".into());
        }
        let mut layer_budgets: Vec<Option<usize>> = budgets.iter().copied().map(Some).collect();
        layer_budgets.resize(geometry.layers, None);
        let thresholds = encoder.allocate_layers(&layer_budgets)?;
        for (layer, threshold) in thresholds.iter().enumerate() {
            println!("  layer {}: slope threshold {:.3}", layer, threshold);
        }
    }

    let mut body = J2kBitWriter::new();
    let mut headers = J2kBitWriter::new();
    let count = encoder.encode_packets(&mut body, packed.then_some(&mut headers))?;
    let body = body.finish()?;
    let headers = headers.finish()?;
    println!(
        "✓ Encoded {} packets: {} body bytes, {} packed header bytes",
        count,
        body.len(),
        headers.len()
    );

    let reference = encoder.into_tile();
    let mut decoder = Tier2Decoder::new(J2kTile::new(&params)?)?;
    if packed {
        decoder.add_packed_headers(&headers)?;
    }
    let consumed = decoder.decode_packets(&body)?;
    println!(
        "✓ Decoded {} packets from {} bytes",
        decoder.num_packets(),
        consumed
    );

    let mut checked = 0;
    for (expected, decoded) in reference.codeblocks().zip(decoder.tile().codeblocks()) {
        let sent = expected.passes.iter().filter(|p| p.layer.is_some()).count();
        let end = if sent == 0 { 0 } else { expected.passes[sent - 1].end };
        if decoded.num_passes_included != sent || decoded.segment_data() != expected.data[..end] {
            return Err(format!("code-block {} does not match", checked).into());
        }
        checked += 1;
    }
    println!("✓ {} code-blocks match", checked);
    Ok(())
}
