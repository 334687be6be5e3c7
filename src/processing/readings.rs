//! Recent-leg ring buffer and its retained-memory encoding

use std::collections::VecDeque;

use crate::core::constants::READING_CAPACITY;
use crate::core::Leg;

use super::triple_shot::is_triple_shot;

const LEG_BYTES: usize = 12;

/// Last few committed legs plus the operator's review position.
///
/// The cursor counts back from the newest leg: `-1` is the newest, `-len`
/// the oldest. It is unset until something has been stored or reviewed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingBuffer {
    legs: VecDeque<Leg>,
    capacity: usize,
    cursor: Option<isize>,
}

impl Default for ReadingBuffer {
    fn default() -> Self {
        Self::new(READING_CAPACITY)
    }
}

impl ReadingBuffer {
    /// Capacity is clamped to what the one-byte count can describe
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, u8::MAX as usize);
        Self { legs: VecDeque::with_capacity(capacity), capacity, cursor: None }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn cursor(&self) -> Option<isize> {
        self.cursor
    }

    /// Append, evicting the oldest leg when full, and point the cursor at it
    pub fn store(&mut self, leg: Leg) {
        if self.legs.len() == self.capacity {
            self.legs.pop_front();
        }
        self.legs.push_back(leg);
        self.cursor = Some(-1);
    }

    /// Step the cursor toward the oldest leg, stopping there
    pub fn previous(&mut self) -> Option<&Leg> {
        let len = self.legs.len() as isize;
        if len == 0 {
            return None;
        }
        self.cursor = Some(match self.cursor {
            None => -1,
            Some(c) => (c - 1).max(-len),
        });
        self.current()
    }

    pub fn review_newest(&mut self) -> Option<&Leg> {
        if self.legs.is_empty() {
            return None;
        }
        self.cursor = Some(-1);
        self.current()
    }

    /// Leg under the cursor
    pub fn current(&self) -> Option<&Leg> {
        let cursor = self.cursor?;
        let index = self.legs.len() as isize + cursor;
        usize::try_from(index).ok().and_then(|i| self.legs.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Leg> {
        self.legs.iter()
    }

    /// Whether the newest three legs look like a triple shot
    pub fn triple_shot(&self) -> bool {
        let start = self.legs.len().saturating_sub(3);
        let tail: Vec<Leg> = self.legs.range(start..).copied().collect();
        is_triple_shot(&tail)
    }

    /// Count byte followed by little-endian `f32` triples, oldest first
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.legs.len() * LEG_BYTES);
        out.push(self.legs.len() as u8);
        for leg in &self.legs {
            for value in [leg.azimuth, leg.inclination, leg.distance] {
                out.extend_from_slice(&(value as f32).to_le_bytes());
            }
        }
        out
    }

    /// Rebuild from [`to_bytes`](Self::to_bytes) output. Short or missing data
    /// yields whatever complete legs are present; extra legs beyond the
    /// capacity are dropped from the oldest end.
    pub fn from_bytes(bytes: &[u8], capacity: usize) -> Self {
        let mut buffer = Self::new(capacity);
        let Some((&count, body)) = bytes.split_first() else {
            return buffer;
        };
        for chunk in body.chunks_exact(LEG_BYTES).take(count as usize) {
            let value = |k: usize| {
                let raw = [chunk[4 * k], chunk[4 * k + 1], chunk[4 * k + 2], chunk[4 * k + 3]];
                f64::from(f32::from_le_bytes(raw))
            };
            buffer.store(Leg::new(value(0), value(1), value(2)));
        }
        buffer.cursor = None;
        buffer
    }
}
