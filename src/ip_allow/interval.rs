//! Range-keyed lookup table.
//!
//! [`IntervalMap`] keeps a sorted vector of non-overlapping inclusive
//! intervals. [`IntervalMap::fill`] splits whatever it overlaps so the newest
//! payload wins on the overlapped part, and merges with equal neighbours.
//! Loads of ordered, mostly disjoint ranges append at the tail, so a full
//! build stays close to linear. Lookups are a binary search.
//!
//! [`IpIntervalTable`] pairs one map per address family.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::range::IpRange;

/// Keys usable in an [`IntervalMap`].
pub trait IntervalKey: Copy + Ord + std::fmt::Debug {
    /// The key right after this one, if any.
    fn successor(self) -> Option<Self>;

    /// The key right before this one, if any.
    fn predecessor(self) -> Option<Self>;
}

macro_rules! impl_interval_key {
    ($($t:ty),*) => {
        $(
            impl IntervalKey for $t {
                fn successor(self) -> Option<Self> {
                    self.checked_add(1)
                }

                fn predecessor(self) -> Option<Self> {
                    self.checked_sub(1)
                }
            }
        )*
    };
}

impl_interval_key!(u32, u128);

/// An inclusive `[min, max]` interval with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval<K, V> {
    /// First key covered.
    pub min: K,
    /// Last key covered.
    pub max: K,
    /// Payload for every key in the interval.
    pub value: V,
}

impl<K: IntervalKey, V> Interval<K, V> {
    fn touches(&self, next_min: K) -> bool {
        self.max.successor() == Some(next_min)
    }
}

/// Sorted, non-overlapping intervals with point lookup.
#[derive(Debug, Clone)]
pub struct IntervalMap<K, V> {
    entries: Vec<Interval<K, V>>,
}

impl<K, V> Default for IntervalMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: IntervalKey, V: Clone + PartialEq> IntervalMap<K, V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every key in `[min, max]` to `value`, replacing earlier payloads
    /// on the overlapped part. Empty intervals (`min > max`) are ignored.
    pub fn fill(&mut self, min: K, max: K, value: V) {
        if min > max {
            return;
        }

        // entries[start..end] are exactly the ones overlapping [min, max].
        let start = self.entries.partition_point(|e| e.max < min);
        let end = self.entries.partition_point(|e| e.min <= max);

        let mut replacement = Vec::with_capacity(3);
        let mut index = start;

        if start < end {
            let first = &self.entries[start];
            if first.min < min {
                if let Some(left_max) = min.predecessor() {
                    replacement.push(Interval {
                        min: first.min,
                        max: left_max,
                        value: first.value.clone(),
                    });
                    index += 1;
                }
            }
        }

        replacement.push(Interval {
            min,
            max,
            value,
        });

        if start < end {
            let last = &self.entries[end - 1];
            if last.max > max {
                if let Some(right_min) = max.successor() {
                    replacement.push(Interval {
                        min: right_min,
                        max: last.max,
                        value: last.value.clone(),
                    });
                }
            }
        }

        self.entries.splice(start..end, replacement);
        self.coalesce(index);
    }

    /// Merge the entry at `index` with equal, adjacent neighbours.
    fn coalesce(&mut self, mut index: usize) {
        if index > 0 && self.mergeable(index - 1, index) {
            self.entries[index - 1].max = self.entries[index].max;
            self.entries.remove(index);
            index -= 1;
        }

        if index + 1 < self.entries.len() && self.mergeable(index, index + 1) {
            self.entries[index].max = self.entries[index + 1].max;
            self.entries.remove(index + 1);
        }
    }

    fn mergeable(&self, left: usize, right: usize) -> bool {
        let (left, right) = (&self.entries[left], &self.entries[right]);
        left.value == right.value && left.touches(right.min)
    }
}

impl<K: IntervalKey, V> IntervalMap<K, V> {
    /// Payload of the interval containing `key`.
    #[must_use]
    pub fn find(&self, key: K) -> Option<&V> {
        let index = self.entries.partition_point(|e| e.max < key);
        self.entries
            .get(index)
            .filter(|e| e.min <= key)
            .map(|e| &e.value)
    }

    /// Intervals in ascending key order.
    pub fn iter(&self) -> std::slice::Iter<'_, Interval<K, V>> {
        self.entries.iter()
    }

    /// Number of intervals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map has no intervals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release spare capacity once the map is complete.
    pub fn shrink_to_fit(&mut self) {
        self.entries.shrink_to_fit();
    }
}

/// IPv4 and IPv6 interval maps behind one address-based interface.
#[derive(Debug, Clone)]
pub struct IpIntervalTable<V> {
    v4: IntervalMap<u32, V>,
    v6: IntervalMap<u128, V>,
}

impl<V> Default for IpIntervalTable<V> {
    fn default() -> Self {
        Self {
            v4: IntervalMap::default(),
            v6: IntervalMap::default(),
        }
    }
}

impl<V: Clone + PartialEq> IpIntervalTable<V> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every address in `range` to `value`, overwriting earlier payloads.
    pub fn fill(&mut self, range: &IpRange, value: V) {
        match (range.min(), range.max()) {
            (IpAddr::V4(min), IpAddr::V4(max)) => self.v4.fill(min.into(), max.into(), value),
            (IpAddr::V6(min), IpAddr::V6(max)) => self.v6.fill(min.into(), max.into(), value),
            // IpRange never mixes families.
            _ => {},
        }
    }
}

impl<V> IpIntervalTable<V> {
    /// Payload for the range containing `addr`.
    #[must_use]
    pub fn find(&self, addr: IpAddr) -> Option<&V> {
        match addr {
            IpAddr::V4(addr) => self.v4.find(addr.into()),
            IpAddr::V6(addr) => self.v6.find(addr.into()),
        }
    }

    /// Entries in ascending order, IPv4 before IPv6.
    pub fn iter(&self) -> impl Iterator<Item = (IpRange, &V)> + '_ {
        let v4 = self.v4.iter().map(|e| {
            let range = IpRange::from_bounds(
                IpAddr::V4(Ipv4Addr::from(e.min)),
                IpAddr::V4(Ipv4Addr::from(e.max)),
            );
            (range, &e.value)
        });
        let v6 = self.v6.iter().map(|e| {
            let range = IpRange::from_bounds(
                IpAddr::V6(Ipv6Addr::from(e.min)),
                IpAddr::V6(Ipv6Addr::from(e.max)),
            );
            (range, &e.value)
        });

        v4.chain(v6)
    }

    /// Number of entries across both families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// Check if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Release spare capacity once the table is complete.
    pub fn shrink_to_fit(&mut self) {
        self.v4.shrink_to_fit();
        self.v6.shrink_to_fit();
    }
}
