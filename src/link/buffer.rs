//! Fixed-capacity byte FIFO for inbound payload.
//!
//! One instance backs each connection's receive path. The demultiplexer
//! produces into it one resolved byte-run at a time; callers drain it in
//! FIFO order. Overflow is an explicit error, never a silent drop.

/// Remaining capacity was insufficient for the whole write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Ring buffer over a fixed `N`-byte backing array.
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    head: usize,
    len: usize,
}

impl<const N: usize> RingBuffer<N> {
    pub fn new() -> Self {
        Self {
            buf: [0; N],
            head: 0,
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes currently buffered. O(1).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Append `data` iff it fits in the remaining capacity.
    /// All-or-nothing: on [`Overflow`] the buffer is unchanged.
    pub fn put(&mut self, data: &[u8]) -> Result<(), Overflow> {
        if data.len() > N - self.len {
            return Err(Overflow);
        }
        let tail = (self.head + self.len) % N;
        let first = data.len().min(N - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        self.buf[..data.len() - first].copy_from_slice(&data[first..]);
        self.len += data.len();
        Ok(())
    }

    /// Remove up to `out.len()` oldest bytes into `out`.
    /// Returns the number of bytes actually moved.
    pub fn get(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        let first = n.min(N - self.head);
        out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);
        self.head = (self.head + n) % N;
        self.len -= n;
        n
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
