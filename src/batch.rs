//! Sequential chunks, concurrent items within a chunk.
//!
//! Keeps the node from seeing more than `batch_size` requests from one
//! caller at a time. A failed item is logged and left out of the result.

use futures::future::join_all;
use std::fmt::Display;
use std::future::Future;
use std::ops::Range;

pub fn batch_ranges(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

pub async fn fetch_in_batches<I, T, E, F, Fut>(
    items: Vec<I>,
    batch_size: usize,
    label: &str,
    f: F,
) -> Vec<T>
where
    I: Display,
    E: Display,
    F: Fn(&I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut out = Vec::with_capacity(items.len());
    let mut failed = 0usize;

    for range in batch_ranges(items.len(), batch_size) {
        let chunk = &items[range];
        let results = join_all(chunk.iter().map(&f)).await;
        for (item, res) in chunk.iter().zip(results) {
            match res {
                Ok(v) => out.push(v),
                Err(e) => {
                    failed += 1;
                    log::warn!("[batch] {label} {item} failed: {e}");
                }
            }
        }
    }

    if failed > 0 {
        log::debug!("[batch] {label}: {}/{} ok", out.len(), out.len() + failed);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn twenty_three_items_make_five_chunks() {
        let sizes: Vec<usize> = batch_ranges(23, 5).iter().map(|r| r.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 5, 3]);
        assert!(batch_ranges(0, 5).is_empty());
        assert_eq!(batch_ranges(3, 0).len(), 3);
    }

    #[tokio::test]
    async fn failures_are_dropped_and_order_kept() {
        let items: Vec<u64> = (0..23).collect();
        let out = fetch_in_batches(items, 5, "square", |n| {
            let n = *n;
            async move {
                if n % 7 == 3 {
                    Err(format!("item {n} exploded"))
                } else {
                    Ok(n * n)
                }
            }
        })
        .await;

        // 3, 10 and 17 fail
        assert_eq!(out.len(), 20);
        assert_eq!(out[0], 0);
        assert_eq!(out[3], 16);
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn chunks_never_overlap() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let items: Vec<usize> = (0..12).collect();

        let l = log.clone();
        let out = fetch_in_batches(items, 5, "trace", move |i| {
            let i = *i;
            let l = l.clone();
            async move {
                l.lock().unwrap().push(format!("start {}", i / 5));
                tokio::task::yield_now().await;
                l.lock().unwrap().push(format!("end {}", i / 5));
                Ok::<_, String>(i)
            }
        })
        .await;
        assert_eq!(out.len(), 12);

        // every event of chunk n comes before any event of chunk n + 1
        let events = log.lock().unwrap().clone();
        let chunk_of = |e: &String| e.rsplit(' ').next().unwrap().parse::<usize>().unwrap();
        let chunks: Vec<usize> = events.iter().map(chunk_of).collect();
        assert!(chunks.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(events.len(), 24);
    }
}
