pub mod geometry;
pub mod lru;
pub mod simulation;
pub mod trace;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
use wasm_bindgen::prelude::*;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
#[wasm_bindgen]
pub fn run_simulation(
    set_index_bits: u32,
    associativity: usize,
    block_offset_bits: u32,
    trace: &str,
) -> String {
    use geometry::CacheGeometry;
    use simulation::Simulation;

    let geometry = match CacheGeometry::new(set_index_bits, associativity, block_offset_bits) {
        Ok(geometry) => geometry,
        Err(e) => return e.to_string(),
    };

    let mut simulation = Simulation::new(geometry);
    [
        geometry.format_info(),
        simulation.simulate(trace).to_string(),
    ]
    .join("\n")
}
