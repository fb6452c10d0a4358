/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */
use std::fmt::Display;
use std::net::IpAddr;

use crate::errors::ConfigError;
use crate::range::AddressRange;

/// An ordered, non-overlapping list of ranges treated as one pool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RangeSet {
    ranges: Vec<AddressRange>,
}

impl RangeSet {
    pub fn new(ranges: Vec<AddressRange>) -> Result<Self, ConfigError> {
        if ranges.is_empty() {
            return Err(ConfigError::NoRanges);
        }

        for (i, first) in ranges.iter().enumerate() {
            if let Some(second) = ranges[i + 1..].iter().find(|r| first.overlaps(r)) {
                return Err(ConfigError::OverlappingRanges {
                    first: first.to_string(),
                    second: second.to_string(),
                });
            }
        }

        Ok(RangeSet { ranges })
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    pub fn contains(&self, address: IpAddr) -> bool {
        self.range_for(address).is_some()
    }

    /// The range that owns `address`, if any.
    pub fn range_for(&self, address: IpAddr) -> Option<&AddressRange> {
        self.ranges.iter().find(|r| r.contains(address))
    }

    pub fn is_excluded(&self, address: IpAddr) -> bool {
        self.range_for(address)
            .is_some_and(|range| range.is_excluded(address))
    }

    /// Total number of addresses in the pool, excluded ones included.
    pub fn size(&self) -> u128 {
        self.ranges
            .iter()
            .fold(0u128, |total, range| total.saturating_add(range.size()))
    }

    /// Walks every address of the pool exactly once, starting right after
    /// `cursor`. The range holding the cursor is walked as a ring from that
    /// point, then the remaining ranges follow in configured order. Without a
    /// usable cursor the walk starts at the first range's `range_start`.
    pub fn scan_from(&self, cursor: Option<IpAddr>) -> Scan<'_> {
        let located = cursor.and_then(|cursor| {
            self.ranges
                .iter()
                .position(|r| r.contains(cursor))
                .map(|index| (index, cursor))
        });

        let (first, next) = match located {
            Some((index, cursor)) => (index, self.ranges[index].next(cursor)),
            None => (0, self.ranges[0].range_start()),
        };

        Scan {
            ranges: &self.ranges,
            first,
            walked: 0,
            next,
            left_in_range: self.ranges[first].size(),
        }
    }
}

impl Display for RangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

/// Iterator returned by [`RangeSet::scan_from`].
pub struct Scan<'a> {
    ranges: &'a [AddressRange],
    // Index of the range the walk started in.
    first: usize,
    // Number of ranges fully walked so far.
    walked: usize,
    next: IpAddr,
    left_in_range: u128,
}

impl Scan<'_> {
    fn current(&self) -> &AddressRange {
        &self.ranges[(self.first + self.walked) % self.ranges.len()]
    }
}

impl Iterator for Scan<'_> {
    type Item = IpAddr;

    fn next(&mut self) -> Option<Self::Item> {
        while self.left_in_range == 0 {
            self.walked += 1;
            if self.walked >= self.ranges.len() {
                return None;
            }
            let range = *self.current();
            self.next = range.range_start();
            self.left_in_range = range.size();
        }

        let address = self.next;
        self.left_in_range -= 1;
        self.next = self.current().next(address);
        Some(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn range(subnet: &str, start: &str, end: &str) -> AddressRange {
        AddressRange::new(subnet.parse().unwrap(), Some(ip(start)), Some(ip(end)), None).unwrap()
    }

    fn two_ranges() -> RangeSet {
        RangeSet::new(vec![
            range("10.0.0.0/24", "10.0.0.10", "10.0.0.12"),
            range("10.0.1.0/24", "10.0.1.20", "10.0.1.21"),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_set_is_rejected() {
        assert!(matches!(RangeSet::new(vec![]), Err(ConfigError::NoRanges)));
    }

    #[test]
    fn test_overlapping_ranges_are_rejected() {
        let err = RangeSet::new(vec![
            range("10.0.0.0/24", "10.0.0.10", "10.0.0.20"),
            range("10.0.0.0/24", "10.0.0.15", "10.0.0.30"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingRanges { .. }));
    }

    #[test]
    fn test_range_for() {
        let set = two_ranges();
        assert_eq!(set.range_for(ip("10.0.1.21")), Some(&set.ranges()[1]));
        assert!(set.range_for(ip("10.0.0.13")).is_none());
        assert!(set.contains(ip("10.0.0.11")));
        assert!(!set.contains(ip("10.0.1.22")));
        assert_eq!(set.size(), 5);
    }

    #[test]
    fn test_scan_without_cursor_starts_at_first_range() {
        let set = two_ranges();
        let walked: Vec<IpAddr> = set.scan_from(None).collect();
        assert_eq!(
            walked,
            vec![
                ip("10.0.0.10"),
                ip("10.0.0.11"),
                ip("10.0.0.12"),
                ip("10.0.1.20"),
                ip("10.0.1.21"),
            ]
        );
    }

    #[test]
    fn test_scan_resumes_after_cursor_and_visits_everything_once() {
        let set = two_ranges();
        let walked: Vec<IpAddr> = set.scan_from(Some(ip("10.0.0.11"))).collect();
        assert_eq!(
            walked,
            vec![
                ip("10.0.0.12"),
                ip("10.0.0.10"),
                ip("10.0.0.11"),
                ip("10.0.1.20"),
                ip("10.0.1.21"),
            ]
        );

        let walked: Vec<IpAddr> = set.scan_from(Some(ip("10.0.1.21"))).collect();
        assert_eq!(
            walked,
            vec![
                ip("10.0.1.20"),
                ip("10.0.1.21"),
                ip("10.0.0.10"),
                ip("10.0.0.11"),
                ip("10.0.0.12"),
            ]
        );
    }

    #[test]
    fn test_scan_with_stale_cursor() {
        let set = two_ranges();
        let first = set.scan_from(Some(ip("192.168.0.1"))).next();
        assert_eq!(first, Some(ip("10.0.0.10")));
        assert_eq!(set.scan_from(Some(ip("192.168.0.1"))).count(), 5);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            two_ranges().to_string(),
            "10.0.0.10-10.0.0.12,10.0.1.20-10.0.1.21"
        );
    }
}
