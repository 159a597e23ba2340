//! Fairness buffer (§4.1).
//!
//! Imposes a uniform delay `D` between order acceptance and match
//! eligibility. Grounded on `original_source/.../engine/buffer.go`'s
//! `container/heap`-based `FairnessBuffer`, reexpressed with
//! `std::collections::BinaryHeap` (a max-heap, so entries are wrapped in
//! `Reverse` to get min-release-time-first ordering) and a
//! `parking_lot::Mutex` for the single-lock discipline of §5.

use crate::types::Order;
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// An order stamped with the instant at which it becomes eligible to match.
struct BufferedOrder {
    release_at: Instant,
    /// Insertion sequence number; breaks ties between equal release times
    /// so that, per §4.1, "ties broken by insertion order".
    sequence: u64,
    order: Order,
}

impl PartialEq for BufferedOrder {
    fn eq(&self, other: &Self) -> bool {
        self.release_at == other.release_at && self.sequence == other.sequence
    }
}
impl Eq for BufferedOrder {}

impl Ord for BufferedOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release_at
            .cmp(&other.release_at)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}
impl PartialOrd for BufferedOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<Reverse<BufferedOrder>>,
    next_sequence: u64,
}

/// Global, delay-gated priority queue that releases accepted orders for
/// matching after `delay` has elapsed.
pub struct FairnessBuffer {
    delay: Duration,
    inner: Mutex<Inner>,
}

impl FairnessBuffer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_sequence: 0,
            }),
        }
    }

    /// Stamp `order` with `release_time = now + delay` and insert it.
    pub fn add(&self, order: Order) {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.heap.push(Reverse(BufferedOrder {
            release_at: Instant::now() + self.delay,
            sequence,
            order,
        }));
    }

    /// Pop and return every order whose release time has elapsed, in
    /// release-time order (ties by insertion order).
    pub fn drain_ready(&self) -> Vec<Order> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut ready = Vec::new();

        while let Some(Reverse(top)) = inner.heap.peek() {
            if top.release_at > now {
                break;
            }
            let Reverse(popped) = inner.heap.pop().expect("peeked element must be present");
            ready.push(popped.order);
        }

        ready
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, Side};
    use chrono::Utc;

    fn make_order(id: u64) -> Order {
        Order {
            id,
            user_id: "u".into(),
            market_id: "m".into(),
            side: Side::Buy,
            outcome: Outcome::Yes,
            price: 50,
            quantity: 1,
            accept_time: Utc::now(),
        }
    }

    #[test]
    fn zero_delay_orders_are_immediately_ready() {
        let buf = FairnessBuffer::new(Duration::ZERO);
        buf.add(make_order(1));
        buf.add(make_order(2));
        let ready = buf.drain_ready();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].id, 1);
        assert_eq!(ready[1].id, 2);
    }

    #[test]
    fn nonzero_delay_orders_are_not_immediately_ready() {
        let buf = FairnessBuffer::new(Duration::from_secs(3));
        buf.add(make_order(1));
        assert!(buf.drain_ready().is_empty());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn drain_preserves_insertion_order_for_equal_delay() {
        // S6: submissions 10ms apart under a fixed delay become eligible
        // together; the heartbeat must still see submission order.
        let buf = FairnessBuffer::new(Duration::from_millis(5));
        buf.add(make_order(10));
        std::thread::sleep(Duration::from_millis(10));
        buf.add(make_order(20));
        std::thread::sleep(Duration::from_millis(10));

        let ready = buf.drain_ready();
        assert_eq!(ready.iter().map(|o| o.id).collect::<Vec<_>>(), vec![10, 20]);
    }
}
