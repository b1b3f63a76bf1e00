//! Stack-scoped temporary buffers for hot loops.
//!
//! The original reaches for `alloca` to grab throwaway working storage inside
//! `calc`/`backprop` without touching the heap. Rust has no safe equivalent,
//! so `Scratch` wraps a `Vec<f32>` acquired once per call and dropped at
//! scope exit; it still avoids repeated allocation across an episode by
//! letting callers reuse one `Scratch` across many `calc` calls via `resize`.

use super::vec::{Buffer, Slice};

/// A reusable scratch buffer. Not thread-shared; one per worker thread.
#[derive(Debug, Default)]
pub struct Scratch {
    buf: Buffer,
}

impl Scratch {
    pub fn new() -> Scratch {
        Scratch { buf: Buffer::zeros(0) }
    }

    /// Ensures capacity for `len` elements and returns a zeroed view into it.
    pub fn take(&mut self, len: usize) -> Slice<'_> {
        self.buf.realloc_uninitialized(len);
        let mut s = self.buf.slice();
        s.assign_scalar(0.0);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_scratch_zeroes_each_take() {
        let mut scratch = Scratch::new();
        {
            let mut s = scratch.take(3);
            s.set(0, 5.0);
        }
        let s = scratch.take(3);
        assert_eq!(s.as_slice(), &[0.0, 0.0, 0.0]);
    }
}
