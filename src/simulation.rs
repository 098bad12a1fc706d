use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::geometry::CacheGeometry;
use crate::lru::{CacheHit, LruCache};
use crate::trace::{Operation, Record};

#[derive(thiserror::Error, Debug)]
pub enum SimulationError {
    #[error("failed to open trace file {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read trace line {line}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Hit, miss and eviction counts of a run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl Summary {
    fn record(&mut self, cache_hit: CacheHit) {
        match cache_hit {
            CacheHit::Hit => self.hits += 1,
            CacheHit::Miss { evicted } => {
                self.misses += 1;
                if evicted.is_some() {
                    self.evictions += 1;
                }
            }
        }
    }

    /// Number of resolved memory references.
    pub fn references(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn percent_hit(&self) -> f64 {
        self.percent_of_references(self.hits)
    }

    pub fn percent_miss(&self) -> f64 {
        self.percent_of_references(self.misses)
    }

    fn percent_of_references(&self, count: u64) -> f64 {
        match self.references() {
            0 => 0.0,
            total => 100.0 * count as f64 / total as f64,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        )
    }
}

/// Outcome of the one or two references a record makes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub first: CacheHit,
    /// Only set for [`Operation::Modify`], whose store follows the load.
    pub second: Option<CacheHit>,
}

impl RecordOutcome {
    pub fn iter(&self) -> impl Iterator<Item = CacheHit> {
        std::iter::once(self.first).chain(self.second)
    }
}

impl std::fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.first)?;
        if let Some(second) = self.second {
            write!(f, " {second}")?;
        }
        Ok(())
    }
}

/// A single simulation session.
///
/// Owns the cache, the logical clock and the counters. The clock starts at 1
/// and advances once per memory reference.
#[derive(Debug, Clone)]
pub struct Simulation {
    cache: LruCache,
    clock: u64,
    summary: Summary,
}

impl Simulation {
    pub fn new(geometry: CacheGeometry) -> Self {
        Self {
            cache: LruCache::new(geometry),
            clock: 1,
            summary: Summary::default(),
        }
    }

    pub fn cache(&self) -> &LruCache {
        &self.cache
    }

    /// Timestamp the next reference will be resolved with.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn reset(&mut self) {
        self.cache.reset();
        self.clock = 1;
        self.summary = Summary::default();
    }

    /// Resolves one memory reference at the current clock and advances it.
    pub fn resolve(&mut self, address: u64) -> CacheHit {
        let timestamp = self.clock;
        self.clock += 1;

        let cache_hit = self.cache.get(address, timestamp);
        self.summary.record(cache_hit);
        cache_hit
    }

    /// Applies one record. Instruction fetches are not simulated and yield `None`.
    pub fn step(&mut self, record: &Record) -> Option<RecordOutcome> {
        match record.operation {
            Operation::Instruction => None,
            Operation::Load | Operation::Store => Some(RecordOutcome {
                first: self.resolve(record.address),
                second: None,
            }),
            Operation::Modify => {
                let first = self.resolve(record.address);
                let second = self.resolve(record.address);
                Some(RecordOutcome {
                    first,
                    second: Some(second),
                })
            }
        }
    }

    /// Parses and applies one trace line.
    ///
    /// Blank and malformed lines leave the session untouched.
    pub fn step_line(&mut self, line_number: usize, line: &str) -> Option<(Record, RecordOutcome)> {
        if line.trim().is_empty() {
            return None;
        }

        let record = match Record::try_from(line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("skipping malformed trace line {line_number}:\n{e}");
                return None;
            }
        };

        self.step(&record).map(|outcome| (record, outcome))
    }

    /// Replays every line of `reader`, calling `on_record` after each simulated record.
    pub fn replay<R: BufRead>(
        &mut self,
        reader: R,
        mut on_record: impl FnMut(&Record, &RecordOutcome),
    ) -> Result<Summary, SimulationError> {
        for (idx, line) in reader.split(b'\n').enumerate() {
            let line_number = idx + 1;
            let line = line.map_err(|source| SimulationError::Read {
                line: line_number,
                source,
            })?;

            let Ok(line) = std::str::from_utf8(&line) else {
                log::warn!("skipping trace line {line_number}: not valid UTF-8");
                continue;
            };

            if let Some((record, outcome)) = self.step_line(line_number, line) {
                on_record(&record, &outcome);
            }
        }

        Ok(self.summary)
    }

    pub fn simulate_file(
        &mut self,
        file: impl AsRef<Path>,
        on_record: impl FnMut(&Record, &RecordOutcome),
    ) -> Result<Summary, SimulationError> {
        let path = file.as_ref();
        let file = File::open(path).map_err(|source| SimulationError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("replaying {}", path.display());
        self.replay(BufReader::new(file), on_record)
    }

    pub fn simulate(&mut self, trace: &str) -> Summary {
        for (idx, line) in trace.lines().enumerate() {
            self.step_line(idx + 1, line);
        }
        self.summary
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn simulation(set_index_bits: u32, associativity: usize, block_offset_bits: u32) -> Simulation {
        Simulation::new(
            CacheGeometry::new(set_index_bits, associativity, block_offset_bits).unwrap(),
        )
    }

    fn summary(hits: u64, misses: u64, evictions: u64) -> Summary {
        Summary {
            hits,
            misses,
            evictions,
        }
    }

    #[test]
    fn direct_mapped_conflict_scenario() {
        let mut sim = simulation(1, 1, 0);
        let result = sim.simulate(" L 10,1\n L 20,1\n L 10,1\n");
        assert_eq!(result, summary(0, 3, 2));
        assert_eq!(result.to_string(), "hits:0 misses:3 evictions:2");
    }

    #[test]
    fn capacity_fill_never_evicts() {
        let (s, e, b) = (3, 4, 5);
        let mut sim = simulation(s, e, b);
        for tag in 0..e as u64 {
            for set in 0..(1u64 << s) {
                let address = (tag << (s + b)) | (set << b) | 0x7;
                assert!(!sim.resolve(address).is_hit());
            }
        }
        assert_eq!(sim.summary(), summary(0, 32, 0));
    }

    #[test]
    fn repeated_address_hits() {
        let mut sim = simulation(2, 1, 2);
        assert!(!sim.resolve(0xabc).is_hit());
        assert!(sim.resolve(0xabc).is_hit());
    }

    #[test]
    fn evicts_least_recently_touched_tag() {
        // fully associative, 3 ways
        let mut sim = simulation(0, 3, 0);
        sim.simulate("L 1,1\nL 2,1\nL 3,1\nL 1,1\nL 4,1\n");
        assert_eq!(sim.summary(), summary(1, 4, 1));
        assert!(sim.cache().contains(1));
        assert!(!sim.cache().contains(2));
        assert!(sim.cache().contains(3));
        assert!(sim.cache().contains(4));
    }

    #[test]
    fn modify_is_load_then_store() {
        let mut sim = simulation(4, 1, 4);
        let cold = Record::try_from(" M 20,1").unwrap();
        let outcome = sim.step(&cold).unwrap();
        assert_eq!(
            outcome,
            RecordOutcome {
                first: CacheHit::Miss { evicted: None },
                second: Some(CacheHit::Hit),
            }
        );
        assert_eq!(outcome.to_string(), "miss hit");

        let outcome = sim.step(&cold).unwrap();
        assert_eq!(outcome.to_string(), "hit hit");
        assert_eq!(sim.clock(), 5);
    }

    #[test]
    fn modify_store_can_hit_after_eviction() {
        let mut sim = simulation(0, 1, 0);
        sim.simulate("L 1,1\nM 2,1\n");
        assert_eq!(sim.summary(), summary(1, 2, 1));
    }

    #[test]
    fn instruction_fetches_and_garbage_are_ignored() {
        let mut sim = simulation(1, 1, 0);
        let result = sim.simulate("I 10,4\n\n  garbage\nL 10,1\nS 10,1 trailing\nI 20,4\n");
        assert_eq!(result, summary(0, 1, 0));
        assert_eq!(sim.clock(), 2);
    }

    #[test]
    fn zero_associativity_misses_everything() {
        let mut sim = simulation(2, 0, 2);
        let result = sim.simulate("L 10,1\nL 10,1\nM 10,1\n");
        assert_eq!(result, summary(0, 4, 0));
    }

    #[test]
    fn replay_reports_each_simulated_record() {
        let mut sim = simulation(0, 1, 0);
        let trace = "L 1,1\nI 2,1\nM 2,1\nS 1,1\n";
        let mut verbose = Vec::new();
        let result = sim
            .replay(trace.as_bytes(), |record, outcome| {
                verbose.push(format!("{record} {outcome}"))
            })
            .unwrap();

        assert_eq!(
            verbose,
            ["L 1,1 miss", "M 2,1 miss eviction hit", "S 1,1 miss eviction"]
        );
        assert_eq!(result, summary(1, 3, 2));
    }

    #[test]
    fn non_utf8_line_is_skipped() {
        let mut sim = simulation(1, 1, 0);
        let result = sim
            .replay(&b" L 10,1\n\xff\xfe garbage\n L 10,1\r\n"[..], |_, _| {})
            .unwrap();
        assert_eq!(result, summary(1, 1, 0));
        assert_eq!(sim.clock(), 3);
    }

    #[test]
    fn reset_restarts_session() {
        let mut sim = simulation(1, 2, 0);
        sim.simulate("L 1,1\nL 1,1\n");
        sim.reset();
        assert_eq!(sim.summary(), Summary::default());
        assert_eq!(sim.clock(), 1);
        assert!(!sim.resolve(1).is_hit());
    }

    #[test]
    fn missing_file_fails_before_simulating() {
        let mut sim = simulation(1, 1, 0);
        let err = sim
            .simulate_file("/nonexistent/csim/trace.trace", |_, _| {})
            .unwrap_err();
        assert!(matches!(err, SimulationError::Open { .. }));
        assert_eq!(sim.clock(), 1);
    }

    #[test]
    fn percentages() {
        let result = summary(3, 1, 0);
        assert_eq!(result.references(), 4);
        assert_eq!(result.percent_hit(), 75.0);
        assert_eq!(result.percent_miss(), 25.0);
        assert_eq!(Summary::default().percent_hit(), 0.0);
    }
}
