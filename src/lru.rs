use crate::geometry::CacheGeometry;

/// Set-associative cache with least-recently-used replacement.
///
/// Only tags and recency are modeled, block contents are not.
/// Recency is a caller supplied logical timestamp which must be strictly
/// increasing across calls to [`LruCache::get`].
#[derive(Debug, Clone)]
pub struct LruCache {
    geometry: CacheGeometry,
    sets: Vec<CacheSet>,
}

impl LruCache {
    pub fn new(geometry: CacheGeometry) -> Self {
        log::debug!(
            "allocating {} sets x {} lines",
            geometry.num_sets(),
            geometry.associativity()
        );
        Self {
            sets: vec![CacheSet::new(geometry.associativity()); geometry.num_sets()],
            geometry,
        }
    }

    pub fn geometry(&self) -> &CacheGeometry {
        &self.geometry
    }

    pub fn reset(&mut self) {
        self.sets
            .iter_mut()
            .for_each(|set| set.lines.fill(CacheLine::default()));
    }

    pub fn get(&mut self, address: u64, timestamp: u64) -> CacheHit {
        let set_index = self.geometry.set_index(address);
        let tag = self.geometry.tag(address);

        let cache_hit = self.sets[set_index].get(tag, timestamp);
        log::trace!("{address:#x} -> set {set_index} tag {tag:#x} @{timestamp}: {cache_hit}");
        cache_hit
    }

    /// Lines of the set with the given index, `None` if out of range.
    pub fn set(&self, set_index: usize) -> Option<&[CacheLine]> {
        self.sets.get(set_index).map(|set| set.lines.as_slice())
    }

    /// Whether the block holding `address` is currently cached.
    pub fn contains(&self, address: u64) -> bool {
        let tag = self.geometry.tag(address);
        self.sets[self.geometry.set_index(address)]
            .lines
            .iter()
            .any(|line| line.valid && line.tag == tag)
    }
}

#[derive(Debug, Clone)]
struct CacheSet {
    lines: Vec<CacheLine>,
}

impl CacheSet {
    fn new(ways: usize) -> Self {
        Self {
            lines: vec![CacheLine::default(); ways],
        }
    }

    fn get(&mut self, tag: u64, timestamp: u64) -> CacheHit {
        // Cache-Hit: refresh recency, tag and valid bit stay untouched
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.valid && line.tag == tag)
        {
            line.last_used = timestamp;
            return CacheHit::Hit;
        }

        // Cache-Miss: fill the first empty line, otherwise replace the least recently used one
        let Some(victim) = self.victim() else {
            // zero ways: nothing to fill and nothing to evict
            return CacheHit::Miss { evicted: None };
        };

        let line = &mut self.lines[victim];
        let evicted = line.valid.then_some(line.tag);
        *line = CacheLine {
            valid: true,
            tag,
            last_used: timestamp,
        };

        CacheHit::Miss { evicted }
    }

    /// Invalid lines order before valid ones, `min_by_key` keeps the lowest index on ties.
    fn victim(&self) -> Option<usize> {
        self.lines
            .iter()
            .enumerate()
            .min_by_key(|(_, line)| (line.valid, line.last_used))
            .map(|(line_idx, _)| line_idx)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheLine {
    pub valid: bool,
    pub tag: u64,
    pub last_used: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheHit {
    Hit,
    /// `evicted` holds the tag of the replaced line, if the victim was valid.
    Miss { evicted: Option<u64> },
}

impl CacheHit {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheHit::Hit)
    }

    pub fn is_eviction(&self) -> bool {
        matches!(self, CacheHit::Miss { evicted: Some(_) })
    }
}

impl std::fmt::Display for CacheHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheHit::Hit => f.write_str("hit"),
            CacheHit::Miss { evicted: Some(_) } => f.write_str("miss eviction"),
            CacheHit::Miss { evicted: None } => f.write_str("miss"),
        }
    }
}
