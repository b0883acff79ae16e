use crossbeam_queue::ArrayQueue;

/// A bounded FIFO that drops the oldest entry to make room on overflow,
/// built on `crossbeam_queue::ArrayQueue`. `ArrayQueue::push` rejects on a
/// full queue rather than overwriting, so the drop-oldest policy is
/// implemented here as an explicit pop-then-push.
pub struct BoundedQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedQueue {
            inner: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Pushes `item`, dropping the oldest entry if the queue was full.
    pub fn push(&self, item: T) {
        let mut item = item;
        loop {
            match self.inner.push(item) {
                Ok(()) => return,
                Err(rejected) => {
                    item = rejected;
                    // Make room; if another consumer races us empty, just
                    // retry the push.
                    let _ = self.inner.pop();
                }
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_on_overflow() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }
}
