//! Window slot allocator
//!
//! Produces a fixed, reusable grid of window positions so concurrently-open
//! browser windows tile the screen without full overlap.

use std::collections::VecDeque;

use tracing::debug;

/// Maximum number of window positions generated.
pub const MAX_SLOTS: usize = 16;

/// Step between neighbouring positions, in pixels.
pub const SLOT_OFFSET: u32 = 200;

/// An (x, y) screen coordinate exclusively owned by at most one in-flight
/// worker at a time.
pub type WindowSlot = (i32, i32);

/// Fixed set of window placement coordinates.
///
/// Slots are handed out pop-from-front and returned push-to-front, so the
/// most recently freed position is reused first and windows do not jump
/// across the screen between consecutive workers.
#[derive(Debug)]
pub struct WindowSlotAllocator {
    free: VecDeque<WindowSlot>,
    total: usize,
}

impl WindowSlotAllocator {
    /// Generate the slot grid for a screen.
    ///
    /// Starting at (0,0), x advances by [`SLOT_OFFSET`]; when the next x
    /// would place a window partially off the right edge, wrap to x=0 and
    /// advance y. Stops when a wrapped row would run off the bottom edge or
    /// after [`MAX_SLOTS`] positions, whichever comes first.
    pub fn new(screen: (u32, u32), window: (u32, u32)) -> Self {
        let (screen_width, screen_height) = screen;
        let (window_width, window_height) = window;

        let mut free = VecDeque::with_capacity(MAX_SLOTS);
        let mut pos_x: u32 = 0;
        let mut pos_y: u32 = 0;

        for _ in 0..MAX_SLOTS {
            free.push_back((pos_x as i32, pos_y as i32));

            let next_x = pos_x + SLOT_OFFSET;
            if next_x + window_width > screen_width {
                pos_x = 0;
                pos_y += SLOT_OFFSET;
                if pos_y + window_height > screen_height {
                    break;
                }
            } else {
                pos_x = next_x;
            }
        }

        debug!("Window slot grid initialized: {} positions on {}x{}", free.len(), screen_width, screen_height);

        let total = free.len();
        Self { free, total }
    }

    /// Take the frontmost free slot, if any.
    pub fn acquire(&mut self) -> Option<WindowSlot> {
        self.free.pop_front()
    }

    /// Return a slot to the front of the free list.
    pub fn release(&mut self, slot: WindowSlot) {
        self.free.push_front(slot);
    }

    /// Number of currently free slots.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Total number of slots generated at initialization.
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_1920x1080_is_deterministic() {
        let mut alloc = WindowSlotAllocator::new((1920, 1080), (960, 538));

        let mut slots = Vec::new();
        while let Some(s) = alloc.acquire() {
            slots.push(s);
        }

        // 5 columns per row (wrap when x+960 > 1920), rows at y = 0, 200, 400;
        // the wrap to y=600 would run off the bottom (600+538 > 1080).
        let expected: Vec<(i32, i32)> = vec![
            (0, 0), (200, 0), (400, 0), (600, 0), (800, 0),
            (0, 200), (200, 200), (400, 200), (600, 200), (800, 200),
            (0, 400), (200, 400), (400, 400), (600, 400), (800, 400),
        ];
        assert_eq!(slots, expected);
        assert_eq!(alloc.total(), 15);
    }

    #[test]
    fn grid_never_exceeds_max_slots() {
        let alloc = WindowSlotAllocator::new((10_000, 10_000), (960, 538));
        assert_eq!(alloc.total(), MAX_SLOTS);
    }

    #[test]
    fn small_screen_stops_early() {
        let alloc = WindowSlotAllocator::new((1000, 600), (960, 538));
        // Only (0,0): next x wraps immediately and y=200 runs off the bottom.
        assert_eq!(alloc.total(), 1);
    }

    #[test]
    fn release_is_lifo() {
        let mut alloc = WindowSlotAllocator::new((1920, 1080), (960, 538));
        let first = alloc.acquire().unwrap();
        let second = alloc.acquire().unwrap();
        assert_ne!(first, second);

        alloc.release(first);
        // Most recently freed slot comes back first.
        assert_eq!(alloc.acquire(), Some(first));
    }
}
