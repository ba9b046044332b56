//! Correlation id allocation.

/// Id of the global "unsubscribe all" request and its acknowledgement.
pub const UNSUBSCRIBE_ALL_ID: u64 = 1;

/// First id handed out to a subscription group.
pub const FIRST_ID: u64 = UNSUBSCRIBE_ALL_ID + 1;

/// Largest id before wrapping back to [`FIRST_ID`].
pub const MAX_ID: u64 = u32::MAX as u64;

/// Monotonic id counter over `FIRST_ID..=MAX_ID`, wrapping on overflow.
///
/// Each subscription manager owns its own allocator.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
    max: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::with_max(MAX_ID)
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator with a custom ceiling.
    pub fn with_max(max: u64) -> Self {
        Self {
            next: FIRST_ID,
            max: max.max(FIRST_ID + 1),
        }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next = if id >= self.max { FIRST_ID } else { id + 1 };
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_above_reserved_id() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn wraps_to_first_id() {
        let mut ids = IdAllocator::with_max(4);
        let seen: Vec<u64> = (0..5).map(|_| ids.next_id()).collect();
        assert_eq!(seen, vec![2, 3, 4, 2, 3]);
        assert!(!seen.contains(&UNSUBSCRIBE_ALL_ID));
    }
}
