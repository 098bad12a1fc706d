use std::path::PathBuf;

use clap::Parser;
use clap::builder::RangedU64ValueParser;
use color_eyre::eyre::{self, WrapErr};
use csim::geometry::CacheGeometry;
use csim::simulation::Simulation;

#[derive(Parser, Debug, Clone)]
#[command(about = "Replays a memory trace against an LRU cache")]
struct Options {
    #[arg(short = 's', help = "number of set index bits (2^s sets)")]
    set_index_bits: u32,
    #[arg(
        short = 'E',
        value_parser = RangedU64ValueParser::<usize>::new().range(1..),
        help = "associativity (lines per set)"
    )]
    associativity: usize,
    #[arg(short = 'b', help = "number of block offset bits (2^b bytes per line)")]
    block_offset_bits: u32,
    #[arg(short = 't', help = "trace file to replay")]
    trace: PathBuf,
    #[arg(short = 'v', long, help = "print the outcome of every record")]
    verbose: bool,
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let options = Options::parse();
    let geometry = CacheGeometry::new(
        options.set_index_bits,
        options.associativity,
        options.block_offset_bits,
    )
    .wrap_err("invalid cache geometry")?;
    log::info!("{}", geometry.format_info());

    let mut simulation = Simulation::new(geometry);
    let summary = simulation
        .simulate_file(&options.trace, |record, outcome| {
            if options.verbose {
                println!("{record} {outcome}");
            }
        })
        .wrap_err_with(|| format!("failed to simulate {}", options.trace.display()))?;

    println!("{summary}");
    log::info!(
        "Percent Hits: {:.3}%, Percent Misses: {:.3}%",
        summary.percent_hit(),
        summary.percent_miss()
    );
    Ok(())
}
