//! FIFO byte-range allocator over one channel's memory window.
//!
//! The hardware completes descriptors strictly in submission order, so the
//! window behaves as a queue of byte ranges: grants come off the head,
//! releases retire the oldest bytes at the tail. An allocation is never
//! split across the window end; when the head region cannot hold a request
//! the allocator retries from the window start, leaving a dead zone at the
//! end that is skipped when the tail catches up to it.

use streamdbg_protocol::aligned_len;

/// One outbound channel's window allocator. Offsets handed out are absolute
/// within the hardware interface (window base included), ready to be used
/// for bulk copies and descriptor words alike.
#[derive(Debug)]
pub struct RingAllocator {
    base: u32,
    span: usize,
    /// Next grant position, relative to the window base.
    head: usize,
    /// Oldest live byte, relative to the window base.
    tail: usize,
    in_use: usize,
    /// Set while grants have wrapped past the end of the window; the tail
    /// jumps back to the start when it reaches this mark.
    wrap_mark: Option<usize>,
}

impl RingAllocator {
    pub fn new(base: u32, span: usize) -> RingAllocator {
        RingAllocator {
            base,
            span,
            head: 0,
            tail: 0,
            in_use: 0,
            wrap_mark: None,
        }
    }

    pub fn span(&self) -> usize {
        self.span
    }

    pub fn bytes_in_use(&self) -> usize {
        self.in_use
    }

    pub fn bytes_free(&self) -> usize {
        self.span - self.in_use
    }

    /// Grants the oldest free range that can hold `len` bytes rounded up to
    /// the hardware word, or `None` when neither the head region nor the
    /// window start has room. A refused request changes nothing.
    pub fn alloc(&mut self, len: usize) -> Option<u32> {
        let len = aligned_len(len);
        if len > self.bytes_free() {
            return None;
        }

        let granted = match self.wrap_mark {
            None => {
                if self.head + len <= self.span {
                    let at = self.head;
                    self.head += len;
                    at
                } else if len <= self.tail {
                    // Retry from the window start; the bytes between the
                    // head and the window end stay dead until the tail
                    // passes them.
                    self.wrap_mark = Some(self.head);
                    self.head = len;
                    0
                } else {
                    return None;
                }
            }
            Some(_) => {
                if self.head + len <= self.tail {
                    let at = self.head;
                    self.head += len;
                    at
                } else {
                    return None;
                }
            }
        };

        self.in_use += len;
        Some(self.base + granted as u32)
    }

    /// Releases the oldest `len` bytes. `len` must be the summed aligned
    /// sizes of grants the hardware has confirmed complete, so releases
    /// retire whole grants in FIFO order.
    pub fn free(&mut self, len: usize) {
        debug_assert!(len <= self.in_use, "freeing more than is allocated");
        self.in_use -= len;

        match self.wrap_mark {
            Some(mark) => {
                let before_mark = mark - self.tail;
                if len >= before_mark {
                    self.tail = len - before_mark;
                    self.wrap_mark = None;
                } else {
                    self.tail += len;
                }
            }
            None => self.tail += len,
        }

        // A drained window restarts from its base so a later caller can get
        // the full span contiguously again.
        if self.in_use == 0 {
            self.head = 0;
            self.tail = 0;
            self.wrap_mark = None;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn grants_are_fifo_and_aligned() {
        let mut ring = RingAllocator::new(0x1000, 4096);
        assert_eq!(ring.alloc(100), Some(0x1000));
        assert_eq!(ring.alloc(8), Some(0x1068));
        assert_eq!(ring.bytes_in_use(), 112);
        assert_eq!(ring.bytes_free(), 4096 - 112);
    }

    #[test]
    fn refuses_when_full_and_leaves_state_untouched() {
        let mut ring = RingAllocator::new(0, 64);
        assert_eq!(ring.alloc(64), Some(0));
        assert_eq!(ring.alloc(1), None);
        assert_eq!(ring.bytes_in_use(), 64);
        ring.free(64);
        assert_eq!(ring.alloc(64), Some(0));
    }

    #[test]
    fn conservation_holds_across_all_operations() {
        let mut ring = RingAllocator::new(0, 4096);
        let mut outstanding = Vec::new();
        for _ in 0..10 {
            if let Some(_at) = ring.alloc(100) {
                outstanding.push(aligned_len(100));
            }
            assert_eq!(ring.bytes_in_use() + ring.bytes_free(), 4096);
        }
        while let Some(len) = outstanding.first().copied() {
            outstanding.remove(0);
            ring.free(len);
            assert_eq!(ring.bytes_in_use() + ring.bytes_free(), 4096);
        }
        assert_eq!(ring.bytes_in_use(), 0);
    }

    #[test]
    fn allocation_never_straddles_the_window_end() {
        let mut ring = RingAllocator::new(0, 128);
        assert_eq!(ring.alloc(96), Some(0));
        ring.free(96);
        // The window drained, so the cursor is back at the base.
        assert_eq!(ring.alloc(96), Some(0));
        assert_eq!(ring.alloc(16), Some(96));
        ring.free(96);
        // 64 bytes do not fit between the head (112) and the end (128), but
        // the freed region at the start holds them.
        assert_eq!(ring.alloc(64), Some(0));
        // The 16-byte dead zone at the window end is unavailable.
        assert_eq!(ring.bytes_in_use(), 16 + 64);
        assert_eq!(ring.alloc(64), None);
        // Retiring the pre-wrap grant lets the tail skip the dead zone.
        ring.free(16);
        assert_eq!(ring.alloc(32), Some(64));
    }

    #[test]
    fn full_span_allocatable_again_after_quiescence() {
        let mut ring = RingAllocator::new(0, 4096);
        assert_eq!(ring.alloc(100), Some(0));
        ring.free(aligned_len(100));
        assert_eq!(ring.alloc(4096), Some(0));
    }
}
