//! Double buffer with a read side and a write side.
//!
//! A pass borrows the pair through [`PingPong::split`], which hands out the
//! current buffer read-only and the other one writable. The borrow checker
//! then rules out reading and writing the same buffer in one pass. After the
//! pass, [`PingPong::swap`] makes the written buffer current.

use std::ops::{Deref, DerefMut};

/// Read-only view of the current buffer.
pub struct Read<'a, T>(&'a T);

impl<T> Deref for Read<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

/// Writable view of the buffer being produced.
pub struct Write<'a, T>(&'a mut T);

impl<T> Deref for Write<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

impl<T> DerefMut for Write<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.0
    }
}

/// Two buffers and the index of the current one.
#[derive(Debug)]
pub struct PingPong<T> {
    buffers: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    /// `first` starts as current.
    pub fn new(first: T, second: T) -> Self {
        Self {
            buffers: [first, second],
            current: 0,
        }
    }

    /// Index of the current buffer (0 or 1).
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The most recently written buffer.
    #[inline]
    pub fn current(&self) -> &T {
        &self.buffers[self.current]
    }

    /// The buffer written before the current one.
    #[inline]
    pub fn previous(&self) -> &T {
        &self.buffers[1 - self.current]
    }

    /// Both buffers in index order.
    #[inline]
    pub fn both(&self) -> &[T; 2] {
        &self.buffers
    }

    /// Mutable access to the current buffer, for seeding.
    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.buffers[self.current]
    }

    /// Borrow the current buffer for reading and the other for writing.
    pub fn split(&mut self) -> (Read<'_, T>, Write<'_, T>) {
        let [a, b] = &mut self.buffers;
        if self.current == 0 {
            (Read(a), Write(b))
        } else {
            (Read(b), Write(a))
        }
    }

    /// Make the written buffer current.
    #[inline]
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reads_current_writes_other() {
        let mut pp = PingPong::new(vec![1], vec![0]);
        {
            let (read, mut write) = pp.split();
            write[0] = read[0] + 1;
        }
        assert_eq!(pp.current(), &vec![1]);
        pp.swap();
        assert_eq!(pp.current_index(), 1);
        assert_eq!(pp.current(), &vec![2]);
        assert_eq!(pp.previous(), &vec![1]);
    }

    #[test]
    fn test_swap_twice_is_identity() {
        let mut pp = PingPong::new('a', 'b');
        pp.swap();
        pp.swap();
        assert_eq!(*pp.current(), 'a');
        assert_eq!(pp.both(), &['a', 'b']);
    }
}
