//! Cyclic pool scan with per-consumer dedup.
//!
//! Pure function over the ordered pool and the consumer's held set. The
//! cursor advances once per visited slot, duplicates included, and a scan
//! never visits more than one full cycle.

/// Result of planning one allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    /// Number of pool slots visited
    pub visited: usize,
    /// Lead IDs to assign, in visit order
    pub created: Vec<String>,
    /// Position after the last visited slot, in `[0, pool_len)`
    pub new_cursor: u64,
}

/// Plan an allocation of up to `requested` leads starting at `cursor`.
///
/// `held` answers whether the consumer already holds a lead. An empty pool or
/// a zero request visits nothing and leaves the cursor where it is.
pub fn plan_scan<F>(pool: &[String], cursor: u64, requested: usize, held: F) -> ScanPlan
where
    F: Fn(&str) -> bool,
{
    let len = pool.len();
    if len == 0 || requested == 0 {
        return ScanPlan {
            visited: 0,
            created: Vec::new(),
            new_cursor: if len == 0 { 0 } else { cursor % len as u64 },
        };
    }

    let start = (cursor % len as u64) as usize;
    let mut created = Vec::with_capacity(requested.min(len));
    let mut visited = 0;

    while visited < len && created.len() < requested {
        let lead_id = &pool[(start + visited) % len];
        visited += 1;
        if !held(lead_id) {
            created.push(lead_id.clone());
        }
    }

    ScanPlan {
        visited,
        created,
        new_cursor: ((start + visited) % len) as u64,
    }
}
