//! Composite-key index over the accumulators of a run.
//!
//! During booking every (component key, tag) pair gets a dense handle and its
//! accumulator is stored in booking order. [`AccumulatorIndex::seal`] then
//! freezes the key set into a compact open-addressing table:
//!
//! 1. Each (key, tag) is packed into a `u64`, one byte per key component plus
//!    the key depth and the tag code. The packing is injective, so two distinct
//!    pairs can never share a slot key.
//! 2. The table size is `next_prime(2 * entries)` (load factor <= 0.5).
//! 3. Slots are found with a multiplicative (golden-ratio) hash and quadratic
//!    probing. Empty slots hold handle 0; stored handles are offset by one.
//!
//! After sealing nothing can be added. A lookup of a pair that was never booked
//! returns `None`; it never creates a new entry.

use std::collections::HashMap;

use tracing::info;

use crate::detid::ComponentKey;
use crate::error::{Result, ValidationError};
use crate::histogram::Accumulator;
use crate::tag::AccumulatorTag;
use crate::validation::RunPhase;

/// Multiplicative hash constant (Knuth's golden-ratio hash).
const MAGIC_RAND: u64 = 2654435761;

/// Opaque, run-stable reference to a booked accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccumulatorHandle(u32);

impl AccumulatorHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Key packing and hashing ─────────────────────────────────────────────────

/// Pack a (key, tag) pair into a `u64`. Returns `None` if a key component does
/// not fit in a signed byte; such a key can never have been booked.
pub fn pack_key(key: &ComponentKey, tag: AccumulatorTag) -> Option<u64> {
    let mut packed = key.depth() as u64;
    for c in key.components() {
        let byte = i8::try_from(c).ok()? as u8;
        packed = (packed << 8) | byte as u64;
    }
    Some((packed << 8) | tag.code() as u64)
}

/// Map a packed key to its home slot.
pub fn hash_to_index(packed: u64, table_size: u64) -> u64 {
    packed.wrapping_mul(MAGIC_RAND) % table_size
}

pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 || n == 3 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut i = 5u64;
    while i * i <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Return the smallest prime >= n.
pub fn next_prime(n: u64) -> u64 {
    if n <= 2 {
        return 2;
    }
    let mut candidate = n | 1;
    while !is_prime(candidate) {
        candidate += 2;
    }
    candidate
}

// ── Index ───────────────────────────────────────────────────────────────────

/// Sparse (key, tag) → accumulator index with a booking phase and a sealed phase.
#[derive(Debug, Clone, Default)]
pub struct AccumulatorIndex {
    entries: Vec<(ComponentKey, AccumulatorTag)>,
    accumulators: Vec<Accumulator>,
    /// Booking-phase lookup; emptied by `seal`.
    pending: HashMap<u64, u32>,
    /// Sealed table: packed key per slot.
    slot_keys: Vec<u64>,
    /// Sealed table: handle + 1 per slot, 0 marks an empty slot.
    slot_handles: Vec<u32>,
    sealed: bool,
}

impl AccumulatorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a sealed index from entries and accumulators in handle order.
    pub fn from_parts(
        entries: Vec<(ComponentKey, AccumulatorTag)>,
        accumulators: Vec<Accumulator>,
    ) -> Result<Self> {
        if entries.len() != accumulators.len() {
            return Err(ValidationError::BinningMismatch(format!(
                "{} index entries for {} accumulators",
                entries.len(),
                accumulators.len()
            )));
        }
        let mut index = Self::new();
        for ((key, tag), acc) in entries.into_iter().zip(accumulators) {
            index.get_or_create(key, tag, || acc)?;
        }
        index.seal();
        Ok(index)
    }

    /// Return the handle of (key, tag), booking it with `make` if it is new.
    ///
    /// Only valid before [`seal`](Self::seal).
    pub fn get_or_create(
        &mut self,
        key: ComponentKey,
        tag: AccumulatorTag,
        make: impl FnOnce() -> Accumulator,
    ) -> Result<AccumulatorHandle> {
        if self.sealed {
            return Err(ValidationError::InvalidPhase {
                expected: RunPhase::Booking,
                found: RunPhase::Processing,
            });
        }
        let packed = pack_key(&key, tag).ok_or(ValidationError::InvalidGeometryIndex {
            field: "component key",
            value: key
                .components()
                .into_iter()
                .find(|c| i8::try_from(*c).is_err())
                .unwrap_or_default(),
        })?;
        if let Some(&h) = self.pending.get(&packed) {
            return Ok(AccumulatorHandle(h));
        }
        let h = self.entries.len() as u32;
        self.entries.push((key, tag));
        self.accumulators.push(make());
        self.pending.insert(packed, h);
        Ok(AccumulatorHandle(h))
    }

    /// End booking and build the lookup table.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        let table_size = next_prime(2 * self.entries.len() as u64).max(3) as usize;
        let mut slot_keys = vec![0u64; table_size];
        let mut slot_handles = vec![0u32; table_size];

        for (packed, &h) in &self.pending {
            let home = hash_to_index(*packed, table_size as u64);
            for c in 0u64.. {
                let i = ((home + c * c) % table_size as u64) as usize;
                if slot_handles[i] == 0 {
                    slot_keys[i] = *packed;
                    slot_handles[i] = h + 1;
                    break;
                }
            }
        }

        info!(
            "Sealed accumulator index: {} entries, table size {} (load factor {:.2})",
            self.entries.len(),
            table_size,
            self.entries.len() as f64 / table_size as f64
        );

        self.pending.clear();
        self.slot_keys = slot_keys;
        self.slot_handles = slot_handles;
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Look up (key, tag) without ever creating an entry.
    pub fn lookup(&self, key: &ComponentKey, tag: AccumulatorTag) -> Option<AccumulatorHandle> {
        let packed = pack_key(key, tag)?;
        if !self.sealed {
            return self.pending.get(&packed).map(|&h| AccumulatorHandle(h));
        }
        let table_size = self.slot_handles.len() as u64;
        let home = hash_to_index(packed, table_size);
        for c in 0..table_size {
            let i = ((home + c * c) % table_size) as usize;
            match self.slot_handles[i] {
                0 => return None,
                h if self.slot_keys[i] == packed => return Some(AccumulatorHandle(h - 1)),
                _ => {}
            }
        }
        None
    }

    /// Like [`lookup`](Self::lookup), but a missing pair is an `UnknownComponentKey` error.
    pub fn require(&self, key: &ComponentKey, tag: AccumulatorTag) -> Result<AccumulatorHandle> {
        self.lookup(key, tag)
            .ok_or(ValidationError::UnknownComponentKey {
                key: *key,
                tag: Some(tag),
            })
    }

    pub fn get(&self, handle: AccumulatorHandle) -> &Accumulator {
        &self.accumulators[handle.index()]
    }

    pub fn get_mut(&mut self, handle: AccumulatorHandle) -> &mut Accumulator {
        &mut self.accumulators[handle.index()]
    }

    /// Number of booked accumulators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Booked (key, tag) pairs in handle order.
    pub fn entries(&self) -> &[(ComponentKey, AccumulatorTag)] {
        &self.entries
    }

    pub fn accumulators(&self) -> &[Accumulator] {
        &self.accumulators
    }

    /// Iterate over (key, tag, accumulator) in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (&ComponentKey, AccumulatorTag, &Accumulator)> {
        self.entries
            .iter()
            .zip(&self.accumulators)
            .map(|((k, t), a)| (k, *t, a))
    }

    pub fn into_parts(self) -> (Vec<(ComponentKey, AccumulatorTag)>, Vec<Accumulator>) {
        (self.entries, self.accumulators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::{Axis, Histogram1D};

    fn h1() -> Accumulator {
        Accumulator::H1(Histogram1D::new(Axis::uniform(4, 0.0, 4.0).unwrap()))
    }

    #[test]
    fn test_packing_is_injective_across_depths() {
        let t = AccumulatorTag::SimOccupancyDet;
        let a = pack_key(&ComponentKey::Station(1, 1), t).unwrap();
        let b = pack_key(&ComponentKey::Layer(1, 1, 0), t).unwrap();
        let c = pack_key(&ComponentKey::Station(-1, 1), t).unwrap();
        let d = pack_key(&ComponentKey::Station(1, 1), AccumulatorTag::MatchedOccupancyDet).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(pack_key(&ComponentKey::Roll(1, 1, 1, 300), t).is_none());
    }

    #[test]
    fn test_booking_then_sealed_lookup() {
        let mut index = AccumulatorIndex::new();
        let mut handles = Vec::new();
        for region in [-1, 1] {
            for station in 1..=2 {
                for layer in 1..=2 {
                    for roll in 1..=8 {
                        let key = ComponentKey::Roll(region, station, layer, roll);
                        handles.push((key, index.get_or_create(key, AccumulatorTag::SimOccupancyStrip, h1).unwrap()));
                    }
                }
            }
        }
        // Re-booking returns the existing handle.
        let (k0, h0) = handles[0];
        assert_eq!(index.get_or_create(k0, AccumulatorTag::SimOccupancyStrip, h1).unwrap(), h0);
        assert_eq!(index.len(), 64);

        index.seal();
        assert!(index.is_sealed());
        for (key, h) in &handles {
            assert_eq!(index.lookup(key, AccumulatorTag::SimOccupancyStrip), Some(*h));
        }
        assert_eq!(index.lookup(&k0, AccumulatorTag::MatchedOccupancyStrip), None);
        assert_eq!(index.lookup(&ComponentKey::Roll(1, 1, 1, 9), AccumulatorTag::SimOccupancyStrip), None);
    }

    #[test]
    fn test_sealed_index_rejects_new_entries() {
        let mut index = AccumulatorIndex::new();
        index
            .get_or_create(ComponentKey::Region(1), AccumulatorTag::PullX, h1)
            .unwrap();
        index.seal();
        let err = index
            .get_or_create(ComponentKey::Region(-1), AccumulatorTag::PullX, h1)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPhase { .. }));
        assert_eq!(index.len(), 1);

        let err = index
            .require(&ComponentKey::Region(-1), AccumulatorTag::PullX)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownComponentKey { .. }));
    }

    #[test]
    fn test_from_parts_round_trip() {
        let mut index = AccumulatorIndex::new();
        let h = index
            .get_or_create(ComponentKey::Station(1, 2), AccumulatorTag::TofMuon, h1)
            .unwrap();
        index.get_mut(h).fill(1.5);
        index.seal();
        let (entries, accs) = index.into_parts();
        let rebuilt = AccumulatorIndex::from_parts(entries, accs).unwrap();
        let h2 = rebuilt
            .lookup(&ComponentKey::Station(1, 2), AccumulatorTag::TofMuon)
            .unwrap();
        assert_eq!(rebuilt.get(h2).entries(), 1);
    }

    #[test]
    fn test_next_prime() {
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(8), 11);
        assert_eq!(next_prime(13), 13);
        assert!(is_prime(7919));
        assert!(!is_prime(7917));
    }
}
