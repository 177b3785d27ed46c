//! A byte FIFO over a [`CircularBuffer`].

use crate::error::ArenaError;
use crate::ring::CircularBuffer;

/// Byte-stream FIFO with read and write heads over a double-mapped buffer.
///
/// One byte is always kept free, so `read == write` means empty and the
/// queue holds at most `size() - 1` bytes. Every write and read is a
/// single contiguous copy, even across the end of the buffer.
#[derive(Debug)]
pub struct RingQueue {
    buffer: CircularBuffer,
    read: usize,
    write: usize,
}

impl RingQueue {
    /// Create a queue over a fresh buffer of at least `minimum_size` bytes.
    pub fn new(minimum_size: usize) -> Result<Self, ArenaError> {
        Ok(Self::from_buffer(CircularBuffer::new(minimum_size)?))
    }

    /// Wrap an existing buffer. Its contents are ignored.
    pub fn from_buffer(buffer: CircularBuffer) -> Self {
        Self {
            buffer,
            read: 0,
            write: 0,
        }
    }

    /// Underlying buffer size.
    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    /// Bytes that can be written before the queue is full.
    pub fn space_to_write(&self) -> usize {
        if self.write < self.read {
            self.read - self.write - 1
        } else {
            self.size() - (self.write - self.read) - 1
        }
    }

    /// Bytes waiting to be read.
    pub fn space_to_read(&self) -> usize {
        if self.read <= self.write {
            self.write - self.read
        } else {
            self.size() - (self.read - self.write)
        }
    }

    /// Whether nothing is waiting to be read.
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Append `bytes`. Returns `false`, writing nothing, if they do not fit.
    pub fn write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.space_to_write() {
            return false;
        }
        let start = self.write;
        self.buffer
            .window_mut(start, bytes.len())
            .copy_from_slice(bytes);
        self.write = (start + bytes.len()) % self.size();
        true
    }

    /// Consume `len` bytes. Returns `None`, consuming nothing, if fewer are
    /// available.
    pub fn read(&mut self, len: usize) -> Option<&[u8]> {
        if len > self.space_to_read() {
            return None;
        }
        let start = self.read;
        self.read = (start + len) % self.size();
        Some(self.buffer.window(start, len))
    }

    /// Look at the next `len` bytes without consuming them.
    pub fn peek(&self, len: usize) -> Option<&[u8]> {
        (len <= self.space_to_read()).then(|| self.buffer.window(self.read, len))
    }

    /// Drop everything waiting to be read.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::page_size;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn empty_queue_keeps_one_byte_free() {
        let q = RingQueue::new(page_size()).unwrap();
        assert!(q.is_empty());
        assert_eq!(q.space_to_read(), 0);
        assert_eq!(q.space_to_write(), q.size() - 1);
    }

    #[test]
    fn full_buffer_item_is_rejected() {
        let mut q = RingQueue::new(page_size()).unwrap();
        let size = q.size();
        assert!(!q.write(&vec![1; size]));
        assert!(q.write(&vec![1; size - 1]));
        assert_eq!(q.space_to_write(), 0);
        assert!(!q.write(&[2]));
    }

    #[test]
    fn read_across_seam_is_contiguous() {
        let mut q = RingQueue::new(page_size()).unwrap();
        let size = q.size();
        assert!(q.write(&vec![0; size - 10]));
        assert_eq!(q.read(size - 10).unwrap().len(), size - 10);

        let data: Vec<u8> = (0..40u8).collect();
        assert!(q.write(&data));
        assert_eq!(q.space_to_read(), 40);
        assert_eq!(q.peek(40).unwrap(), &data[..]);
        assert_eq!(q.read(40).unwrap(), &data[..]);
        assert!(q.is_empty());
    }

    #[test]
    fn short_read_consumes_nothing() {
        let mut q = RingQueue::new(1).unwrap();
        assert!(q.write(b"abc"));
        assert!(q.read(4).is_none());
        assert!(q.peek(4).is_none());
        assert_eq!(q.read(3).unwrap(), b"abc");
    }

    #[test]
    fn clear_empties_queue() {
        let mut q = RingQueue::new(1).unwrap();
        assert!(q.write(b"pending"));
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.space_to_write(), q.size() - 1);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Write(Vec<u8>),
        Read(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..1500).prop_map(Op::Write),
            (0usize..1500).prop_map(Op::Read),
        ]
    }

    proptest! {
        #[test]
        fn behaves_like_a_fifo(ops in prop::collection::vec(op(), 1..80)) {
            let mut q = RingQueue::new(4096).unwrap();
            let mut model = VecDeque::new();
            let cap = q.size() - 1;
            for op in ops {
                match op {
                    Op::Write(bytes) => {
                        let fits = model.len() + bytes.len() <= cap;
                        prop_assert_eq!(q.write(&bytes), fits);
                        if fits {
                            model.extend(bytes);
                        }
                    }
                    Op::Read(len) => match q.read(len) {
                        Some(got) => {
                            let want: Vec<u8> = model.drain(..len).collect();
                            prop_assert_eq!(got, &want[..]);
                        }
                        None => prop_assert!(len > model.len()),
                    },
                }
                prop_assert_eq!(q.space_to_read(), model.len());
                prop_assert_eq!(q.space_to_write(), cap - model.len());
            }
        }
    }
}
