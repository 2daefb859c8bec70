use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Cumulative edge count plus the monotonic time of the latest counted edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeSnapshot {
    pub count: u64,
    pub last_edge_us: u64,
}

/// Single-writer sequence lock publishing an [`EdgeSnapshot`].
///
/// The edge reader thread is the only writer; the sampling loop reads. Every
/// field is an atomic, so a reader racing the writer retries instead of
/// observing a torn pair.
#[derive(Debug, Default)]
pub struct EdgeCell {
    seq: AtomicU64,
    count: AtomicU64,
    last_edge_us: AtomicU64,
}

impl EdgeCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must only be called from one thread.
    pub fn publish(&self, snapshot: EdgeSnapshot) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.count.store(snapshot.count, Ordering::Relaxed);
        self.last_edge_us
            .store(snapshot.last_edge_us, Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub fn read(&self) -> EdgeSnapshot {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let snapshot = EdgeSnapshot {
                count: self.count.load(Ordering::Relaxed),
                last_edge_us: self.last_edge_us.load(Ordering::Relaxed),
            };
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return snapshot;
            }
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_zero() {
        assert_eq!(EdgeCell::new().read(), EdgeSnapshot::default());
    }

    #[test]
    fn reads_latest_publish() {
        let cell = EdgeCell::new();
        cell.publish(EdgeSnapshot {
            count: 3,
            last_edge_us: 1500,
        });
        assert_eq!(
            cell.read(),
            EdgeSnapshot {
                count: 3,
                last_edge_us: 1500
            }
        );
    }

    #[test]
    fn concurrent_reader_never_sees_torn_or_decreasing_snapshot() {
        let cell = Arc::new(EdgeCell::new());
        let writer_cell = Arc::clone(&cell);
        let writer = thread::spawn(move || {
            for count in 1..=200_000u64 {
                writer_cell.publish(EdgeSnapshot {
                    count,
                    last_edge_us: count * 7,
                });
            }
        });

        let mut last = 0;
        while last < 200_000 {
            let snapshot = cell.read();
            assert_eq!(snapshot.last_edge_us, snapshot.count * 7);
            assert!(snapshot.count >= last);
            last = snapshot.count;
        }
        writer.join().unwrap();
    }
}
