use crate::lru::CacheLine;

/// Width of a simulated address in bits.
pub const ADDRESS_BITS: u32 = u64::BITS;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("{set_index_bits} set + {block_offset_bits} offset bits exceed a 64 bit address")]
    AddressTooNarrow {
        set_index_bits: u32,
        block_offset_bits: u32,
    },
    #[error("2^{set_index_bits} sets with {associativity} lines each cannot be allocated")]
    TooManyLines {
        set_index_bits: u32,
        associativity: usize,
    },
}

/// Shape of a cache and the masks used to split an address into
/// `| tag | set index | block offset |`.
///
/// Sets: `2^set_index_bits`, lines per set: `associativity`,
/// bytes per line: `2^block_offset_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    set_index_bits: u32,
    associativity: usize,
    block_offset_bits: u32,
    set_mask: u64,
    tag_mask: u64,
}

impl CacheGeometry {
    pub fn new(
        set_index_bits: u32,
        associativity: usize,
        block_offset_bits: u32,
    ) -> Result<Self, GeometryError> {
        let index_bits = set_index_bits
            .checked_add(block_offset_bits)
            .filter(|bits| *bits <= ADDRESS_BITS)
            .ok_or(GeometryError::AddressTooNarrow {
                set_index_bits,
                block_offset_bits,
            })?;

        // both the set table and the lines must fit in a single allocation
        1usize
            .checked_shl(set_index_bits)
            .and_then(|sets| {
                let table = sets.checked_mul(size_of::<Vec<CacheLine>>())?;
                let lines = sets
                    .checked_mul(associativity)?
                    .checked_mul(size_of::<CacheLine>())?;
                Some(table.max(lines))
            })
            .filter(|bytes| *bytes <= isize::MAX as usize)
            .ok_or(GeometryError::TooManyLines {
                set_index_bits,
                associativity,
            })?;

        Ok(Self {
            set_index_bits,
            associativity,
            block_offset_bits,
            set_mask: low_bits(set_index_bits)
                .checked_shl(block_offset_bits)
                .unwrap_or(0),
            tag_mask: low_bits(ADDRESS_BITS - index_bits)
                .checked_shl(index_bits)
                .unwrap_or(0),
        })
    }

    pub fn set_index_bits(&self) -> u32 {
        self.set_index_bits
    }

    pub fn associativity(&self) -> usize {
        self.associativity
    }

    pub fn block_offset_bits(&self) -> u32 {
        self.block_offset_bits
    }

    pub fn tag_bits(&self) -> u32 {
        ADDRESS_BITS - self.set_index_bits - self.block_offset_bits
    }

    pub fn num_sets(&self) -> usize {
        1 << self.set_index_bits
    }

    pub fn set_mask(&self) -> u64 {
        self.set_mask
    }

    pub fn tag_mask(&self) -> u64 {
        self.tag_mask
    }

    /// Bytes per line, saturating at `u64::MAX` for a 64 bit offset.
    pub fn line_size(&self) -> u64 {
        1u64.checked_shl(self.block_offset_bits).unwrap_or(u64::MAX)
    }

    #[inline]
    pub fn set_index(&self, address: u64) -> usize {
        // fits: the masked value is below num_sets, which fits in usize
        (address & self.set_mask)
            .checked_shr(self.block_offset_bits)
            .unwrap_or(0) as usize
    }

    #[inline]
    pub fn tag(&self, address: u64) -> u64 {
        (address & self.tag_mask)
            .checked_shr(self.set_index_bits + self.block_offset_bits)
            .unwrap_or(0)
    }

    pub fn format_info(&self) -> String {
        let total_size = (self.num_sets() as u128)
            .saturating_mul(self.associativity as u128)
            .saturating_mul(u128::from(self.line_size()));

        [
            "LRU Cache:".to_string(),
            format!("\tTotal Size: {total_size}B"),
            format!("\tSets: {}", self.num_sets()),
            format!("\tWays: {}", self.associativity),
            format!("\tLine-Size: {}B", self.line_size()),
            format!(
                "\t| {} tag bits | {} set bits | {} offset bits |",
                self.tag_bits(),
                self.set_index_bits,
                self.block_offset_bits
            ),
        ]
        .join("\n")
    }
}

/// Mask with the lowest `width` bits set, `width <= 64`.
const fn low_bits(width: u32) -> u64 {
    if width == 0 {
        0
    } else {
        u64::MAX >> (ADDRESS_BITS - width)
    }
}
