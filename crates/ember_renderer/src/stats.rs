//! Render statistics.
//!
//! Counters are thread-local on the hot path; worker threads flush them into
//! the global summary when a tile finishes, and the renderer logs the
//! summary once at shutdown. No atomics are touched per ray.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counters {
    ($($name:ident => $label:literal),+ $(,)?) => {
        #[derive(Default)]
        struct LocalCounters {
            $($name: Cell<u64>,)+
        }

        #[derive(Default)]
        pub struct GlobalCounters {
            $($name: AtomicU64,)+
        }

        thread_local! {
            static LOCAL: LocalCounters = LocalCounters::default();
        }

        static GLOBAL: GlobalCounters = GlobalCounters {
            $($name: AtomicU64::new(0),)+
        };

        $(
            /// Bump a thread-local counter.
            #[inline]
            pub fn $name(n: u64) {
                LOCAL.with(|c| c.$name.set(c.$name.get() + n));
            }
        )+

        /// Move this thread's counts into the global summary.
        pub fn flush_thread() {
            LOCAL.with(|c| {
                $(
                    let v = c.$name.replace(0);
                    if v > 0 {
                        GLOBAL.$name.fetch_add(v, Ordering::Relaxed);
                    }
                )+
            });
        }

        /// Snapshot of the global summary.
        pub fn snapshot() -> Vec<(&'static str, u64)> {
            vec![$(($label, GLOBAL.$name.load(Ordering::Relaxed)),)+]
        }

        /// Reset everything, for tests and repeated renders.
        pub fn reset() {
            LOCAL.with(|c| { $(c.$name.set(0);)+ });
            $(GLOBAL.$name.store(0, Ordering::Relaxed);)+
        }
    };
}

counters! {
    rays => "Total Ray Count",
    shadow_rays => "Shadow Ray Count",
    intersection_tests => "Intersection Test",
    dropped_samples => "Dropped Sample Count",
    primary_samples => "Primary Sample Count",
}

/// Log the global summary at info level.
pub fn log_summary() {
    for (label, value) in snapshot() {
        log::info!("{label}: {value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns the global state; parallel test threads would race on
    // reset() otherwise.
    #[test]
    fn test_thread_local_flush() {
        reset();
        rays(5);
        rays(3);
        shadow_rays(2);
        // Local counts are invisible until flushed.
        assert!(snapshot().iter().all(|(_, v)| *v == 0));
        flush_thread();
        let snap = snapshot();
        assert_eq!(snap[0], ("Total Ray Count", 8));
        assert_eq!(snap[1], ("Shadow Ray Count", 2));
        reset();
    }
}
