//! Response cycling state.
//!
//! A stub's responses are served in order, each one `repeat` times, wrapping
//! back to the first after the last. The expanded order is kept explicitly
//! (`orderWithRepeats`) so it can be persisted next to the stub and so
//! appending a response never disturbs the current position.

use serde::{Deserialize, Serialize};

/// Largest `repeat` a single response may carry. Larger counts are
/// rejected by validation and clamped here.
pub const MAX_REPEAT: u32 = 10_000;

/// Trait for types that can have a repeat behavior
pub trait HasRepeatBehavior {
    fn get_repeat(&self) -> Option<u32>;
}

/// Cycling state for one stub.
///
/// Serialized with the stub metadata as
/// `{"orderWithRepeats": [...], "nextIndex": n}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCycle {
    /// Indexes into the response list, each repeated per its repeat count
    #[serde(default)]
    pub order_with_repeats: Vec<usize>,
    /// Position in `order_with_repeats` of the next response to serve
    #[serde(default)]
    pub next_index: usize,
}

impl ResponseCycle {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            order_with_repeats: Vec::new(),
            next_index: 0,
        }
    }

    /// Build the cycle for a full response list, starting at the first
    pub fn for_responses<T: HasRepeatBehavior>(responses: &[T]) -> Self {
        let mut cycle = Self::new();
        for (index, response) in responses.iter().enumerate() {
            cycle.push(index, response.get_repeat().unwrap_or(1));
        }
        cycle
    }

    /// Append `repeat` occurrences of a response index, clamped to
    /// `1..=MAX_REPEAT`. Does not move the current position.
    pub fn push(&mut self, response_index: usize, repeat: u32) {
        let repeat = repeat.clamp(1, MAX_REPEAT) as usize;
        self.order_with_repeats
            .extend(std::iter::repeat(response_index).take(repeat));
    }

    pub fn len(&self) -> usize {
        self.order_with_repeats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_with_repeats.is_empty()
    }

    /// Response index that the next `advance` would return
    #[must_use]
    pub fn peek(&self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        Some(self.order_with_repeats[self.next_index % self.len()])
    }

    /// Return the response index to serve and move to the next position,
    /// wrapping after the last. Returns `None` and leaves the state alone
    /// when there are no responses.
    pub fn advance(&mut self) -> Option<usize> {
        let response_index = self.peek()?;
        self.next_index = (self.next_index % self.len() + 1) % self.len();
        Some(response_index)
    }

    /// Rewind to the first response
    pub fn reset(&mut self) {
        self.next_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct MockResponse {
        repeat: Option<u32>,
    }

    impl HasRepeatBehavior for MockResponse {
        fn get_repeat(&self) -> Option<u32> {
            self.repeat
        }
    }

    fn responses(repeats: &[Option<u32>]) -> Vec<MockResponse> {
        repeats
            .iter()
            .map(|&repeat| MockResponse { repeat })
            .collect()
    }

    #[test]
    fn test_response_cycle_basic() {
        let mut cycle = ResponseCycle::for_responses(&responses(&[None, None, None]));

        assert_eq!(cycle.advance(), Some(0));
        assert_eq!(cycle.advance(), Some(1));
        assert_eq!(cycle.advance(), Some(2));
        assert_eq!(cycle.advance(), Some(0)); // Wrap around
    }

    #[test]
    fn test_per_response_repeat() {
        // First response repeats 2x, second repeats 3x
        let mut cycle = ResponseCycle::for_responses(&responses(&[Some(2), Some(3)]));
        assert_eq!(cycle.order_with_repeats, vec![0, 0, 1, 1, 1]);

        let served: Vec<_> = (0..6).filter_map(|_| cycle.advance()).collect();
        assert_eq!(served, vec![0, 0, 1, 1, 1, 0]);
    }

    #[test]
    fn test_zero_responses_never_mutates() {
        let mut cycle = ResponseCycle::new();

        assert_eq!(cycle.advance(), None);
        assert_eq!(cycle.advance(), None);
        assert_eq!(cycle.next_index, 0);
        assert_eq!(cycle.peek(), None);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut cycle = ResponseCycle::for_responses(&responses(&[None, None]));

        assert_eq!(cycle.peek(), Some(0));
        assert_eq!(cycle.peek(), Some(0));
        cycle.advance();
        assert_eq!(cycle.peek(), Some(1));
    }

    #[test]
    fn test_push_keeps_position() {
        let mut cycle = ResponseCycle::for_responses(&responses(&[None, None]));
        cycle.advance();
        cycle.advance();
        assert_eq!(cycle.next_index, 0);

        cycle.advance();
        cycle.push(2, 2);
        assert_eq!(cycle.next_index, 1);
        assert_eq!(cycle.order_with_repeats, vec![0, 1, 2, 2]);
        assert_eq!(cycle.advance(), Some(1));
        assert_eq!(cycle.advance(), Some(2));
        assert_eq!(cycle.advance(), Some(2));
        assert_eq!(cycle.advance(), Some(0));
    }

    #[test]
    fn test_push_clamps_repeat() {
        let mut cycle = ResponseCycle::new();
        cycle.push(0, u32::MAX);
        cycle.push(1, 0);
        assert_eq!(cycle.len(), MAX_REPEAT as usize + 1);
        assert_eq!(cycle.order_with_repeats.last(), Some(&1));
    }

    #[test]
    fn test_reset() {
        let mut cycle = ResponseCycle::for_responses(&responses(&[None, None, None]));
        cycle.advance();
        cycle.advance();
        assert_eq!(cycle.peek(), Some(2));

        cycle.reset();
        assert_eq!(cycle.peek(), Some(0));
    }

    #[test]
    fn test_persisted_shape() {
        let mut cycle = ResponseCycle::for_responses(&responses(&[Some(2), None]));
        cycle.advance();
        let json = serde_json::to_value(&cycle).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"orderWithRepeats": [0, 0, 1], "nextIndex": 1})
        );
    }

    #[test]
    fn test_out_of_range_next_index_wraps() {
        // A hand-edited meta file may carry a stale position
        let mut cycle = ResponseCycle {
            order_with_repeats: vec![0, 1],
            next_index: 5,
        };
        assert_eq!(cycle.advance(), Some(1));
        assert_eq!(cycle.next_index, 0);
    }

    proptest! {
        #[test]
        fn prop_each_response_served_repeat_times_in_order(
            repeats in proptest::collection::vec(1u32..6, 1..8)
        ) {
            let input: Vec<_> = repeats.iter().map(|&r| Some(r)).collect();
            let mut cycle = ResponseCycle::for_responses(&responses(&input));
            let total: u32 = repeats.iter().sum();
            prop_assert_eq!(cycle.len(), total as usize);

            let served: Vec<usize> = (0..total).filter_map(|_| cycle.advance()).collect();
            let expected: Vec<usize> = repeats
                .iter()
                .enumerate()
                .flat_map(|(i, &r)| std::iter::repeat(i).take(r as usize))
                .collect();
            prop_assert_eq!(served, expected);
            prop_assert_eq!(cycle.next_index, 0);
        }
    }
}
