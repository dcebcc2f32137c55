//! Free-sector tracking for a region file

use super::HEADER_SECTORS;

/// Tracks which sectors of a region file are in use.
///
/// One flag per sector, indexed by sector number. Sectors past the end
/// of the map do not exist yet; allocations that find no free run of the
/// requested length append there.
#[derive(Debug, Clone)]
pub struct SectorMap {
    /// `true` = free
    free: Vec<bool>,
}

impl SectorMap {
    /// Create a map for a file of `total` sectors; all but the header are free
    pub fn new(total: usize) -> Self {
        let total = total.max(HEADER_SECTORS);
        let mut free = vec![true; total];
        for flag in free.iter_mut().take(HEADER_SECTORS) {
            *flag = false;
        }
        Self { free }
    }

    /// Number of sectors the file currently spans
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Whether `count` sectors from `start` all lie inside the file
    pub fn contains(&self, start: usize, count: usize) -> bool {
        start + count <= self.free.len()
    }

    /// Lowest-numbered run of `count` contiguous free sectors
    pub fn find_run(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let mut run_start = 0;
        let mut run_len = 0;
        for (sector, &is_free) in self.free.iter().enumerate() {
            if is_free {
                if run_len == 0 {
                    run_start = sector;
                }
                run_len += 1;
                if run_len == count {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    /// Reserve `count` sectors, reusing a free run or appending at the end.
    ///
    /// Returns the first sector of the reservation.
    pub fn allocate(&mut self, count: usize) -> usize {
        let start = match self.find_run(count) {
            Some(start) => start,
            None => {
                let start = self.free.len();
                self.free.resize(start + count, true);
                start
            }
        };
        self.mark_used(start, count);
        start
    }

    pub fn mark_used(&mut self, start: usize, count: usize) {
        if start + count > self.free.len() {
            self.free.resize(start + count, true);
        }
        for flag in &mut self.free[start..start + count] {
            *flag = false;
        }
    }

    /// True when every sector in `start..start + count` is free
    pub fn is_run_free(&self, start: usize, count: usize) -> bool {
        (start..start + count).all(|i| self.is_free(i))
    }

    /// Return sectors to the free set; the header is never released
    pub fn release(&mut self, start: usize, count: usize) {
        let end = (start + count).min(self.free.len());
        let start = start.max(HEADER_SECTORS);
        if start >= end {
            return;
        }
        for flag in &mut self.free[start..end] {
            *flag = true;
        }
    }

    pub fn is_free(&self, sector: usize) -> bool {
        self.free.get(sector).copied().unwrap_or(true)
    }

    pub fn free_count(&self) -> usize {
        self.free.iter().filter(|&&f| f).count()
    }

    pub fn used_count(&self) -> usize {
        self.free.len() - self.free_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_reserved() {
        let map = SectorMap::new(0);
        assert_eq!(map.len(), 2);
        assert!(!map.is_free(0));
        assert!(!map.is_free(1));
        assert_eq!(map.free_count(), 0);
    }

    #[test]
    fn test_append_when_full() {
        let mut map = SectorMap::new(2);
        assert_eq!(map.allocate(3), 2);
        assert_eq!(map.allocate(1), 5);
        assert_eq!(map.len(), 6);
        assert_eq!(map.used_count(), 6);
    }

    #[test]
    fn test_reuse_lowest_run() {
        let mut map = SectorMap::new(2);
        let a = map.allocate(2); // 2..4
        let b = map.allocate(1); // 4
        let c = map.allocate(2); // 5..7
        assert_eq!((a, b, c), (2, 4, 5));

        map.release(a, 2);
        map.release(c, 2);

        // both holes fit; the lowest wins
        assert_eq!(map.allocate(2), 2);
        // one sector fits into the remaining hole at 5
        assert_eq!(map.allocate(1), 5);
        // a run of 2 no longer fits anywhere but the end
        assert_eq!(map.allocate(2), 7);
    }

    #[test]
    fn test_run_must_be_contiguous() {
        let mut map = SectorMap::new(8);
        map.mark_used(3, 1);
        map.mark_used(5, 1);
        // free: 2, 4, 6, 7
        assert_eq!(map.find_run(1), Some(2));
        assert_eq!(map.find_run(2), Some(6));
        assert_eq!(map.find_run(3), None);
    }

    #[test]
    fn test_is_run_free() {
        let mut map = SectorMap::new(8);
        map.mark_used(4, 2);
        assert!(map.is_run_free(2, 2));
        assert!(!map.is_run_free(3, 2));
        assert!(!map.is_run_free(5, 1));
        assert!(!map.is_run_free(0, 1));
    }

    #[test]
    fn test_release_never_frees_header() {
        let mut map = SectorMap::new(4);
        map.release(0, 4);
        assert!(!map.is_free(0));
        assert!(!map.is_free(1));
        assert!(map.is_free(2));
    }
}
