use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Lock-guarded FIFO between the acceptor and the worker. Unbounded; both
/// ends are O(1). `poll` waits with a timeout so the worker can observe its
/// stop flag between requests.
#[derive(Default)]
pub struct RequestQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        RequestQueue {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.ready.notify_one();
    }

    /// Pop the oldest item, waiting up to `timeout` for one to arrive.
    pub fn poll(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        if let Some(item) = items.pop_front() {
            return Some(item);
        }
        self.ready.wait_for(&mut items, timeout);
        items.pop_front()
    }

    /// Non-blocking pop.
    pub fn try_poll(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order() {
        let queue = RequestQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_poll(), Some(1));
        assert_eq!(queue.try_poll(), Some(2));
        assert_eq!(queue.try_poll(), Some(3));
        assert_eq!(queue.try_poll(), None);
    }

    #[test]
    fn poll_times_out_when_empty() {
        let queue: RequestQueue<u32> = RequestQueue::new();
        assert_eq!(queue.poll(Duration::from_millis(10)), None);
    }

    #[test]
    fn poll_wakes_on_push() {
        let queue = Arc::new(RequestQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(42u32);
        });
        let item = queue.poll(Duration::from_secs(2));
        handle.join().unwrap();
        assert_eq!(item, Some(42));
    }
}
