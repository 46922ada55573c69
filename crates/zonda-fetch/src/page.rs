//! Lazy pagination strategies over page-fetch functions.
//!
//! Each strategy turns an async page fetcher into a stream of items. The
//! streams are pull-based: stopping early never fetches further pages, and
//! no pagination state is shared between strategy instances.

use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use tracing::debug;
use zonda_types::{Window, WindowIter};

/// Identifier fields probed, in order, for a dedup key.
const ITEM_KEY_FIELDS: &[&str] = &["id", "trade_id", "order_id", "funding_id", "tx_hash"];

/// Identifier fields probed, in order, for a last-id pivot. A transaction
/// hash can dedup an item but cannot address the next page.
const PIVOT_KEY_FIELDS: &[&str] = &["id", "trade_id", "order_id", "funding_id"];

/// One fetched page of items plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in encountered order.
    pub items: Vec<T>,
    /// Whether the adapter reports further pages.
    pub has_more: bool,
    /// Continuation token for the next page, when the venue provides one.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page.
    #[must_use]
    pub const fn new(items: Vec<T>, has_more: bool, next_cursor: Option<String>) -> Self {
        Self {
            items,
            has_more,
            next_cursor,
        }
    }

    /// Creates a final page with no continuation.
    #[must_use]
    pub const fn last(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
            next_cursor: None,
        }
    }
}

/// Paginates with an opaque continuation token.
///
/// `fetch` is called with `None` first, then with each `next_cursor` the
/// adapter hands back; every item is yielded in encountered order. The
/// stream ends when a page reports no more data or omits the cursor. An
/// adapter that forever reports more data with a fresh cursor paginates
/// forever; that contract is the adapter's to keep.
pub fn paginate_cursor<T, E, F, Fut>(fetch: F) -> impl Stream<Item = Result<T, E>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    enum State {
        Fetch(Option<String>),
        Done,
    }

    stream::try_unfold(
        (fetch, State::Fetch(None), 0u32),
        |(mut fetch, state, page_no)| async move {
            let State::Fetch(cursor) = state else {
                return Ok(None);
            };
            let page = fetch(cursor).await?;
            debug!(page = page_no + 1, items = page.items.len(), "cursor page fetched");
            let next = match (page.has_more, page.next_cursor) {
                (true, Some(cursor)) => State::Fetch(Some(cursor)),
                _ => State::Done,
            };
            Ok(Some((
                stream::iter(page.items.into_iter().map(Ok::<T, E>)),
                (fetch, next, page_no + 1),
            )))
        },
    )
    .try_flatten()
}

/// Paginates by pivoting on the last item's identifier.
///
/// The pivot for the next page is derived here rather than by the adapter:
/// `key_fn` applied to the final item of the page just fetched. When a page
/// reports more data but no pivot can be derived — the final item exposes
/// no identifier, or the page is empty — pagination stops cleanly after
/// yielding what was fetched. A stalled pagination is a defined
/// termination, not an error.
pub fn paginate_last_id<T, E, F, Fut, K>(fetch: F, key_fn: K) -> impl Stream<Item = Result<T, E>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    K: Fn(&T) -> Option<String>,
{
    enum State {
        Fetch(Option<String>),
        Done,
    }

    stream::try_unfold(
        (fetch, key_fn, State::Fetch(None), 0u32),
        |(mut fetch, key_fn, state, page_no)| async move {
            let State::Fetch(last_id) = state else {
                return Ok(None);
            };
            let page = fetch(last_id).await?;
            debug!(page = page_no + 1, items = page.items.len(), "last-id page fetched");
            let next = if page.has_more {
                match page.items.last().and_then(&key_fn) {
                    Some(pivot) => State::Fetch(Some(pivot)),
                    None => {
                        debug!(page = page_no + 1, "no pivot id on page, stopping pagination");
                        State::Done
                    }
                }
            } else {
                State::Done
            };
            Ok(Some((
                stream::iter(page.items.into_iter().map(Ok::<T, E>)),
                (fetch, key_fn, next, page_no + 1),
            )))
        },
    )
    .try_flatten()
}

/// Paginates over planner windows, deduplicating overlap re-fetches.
///
/// For each window, `fetch` returns the raw items in `[start, end)`. Items
/// whose dedup key (from `key_fn`) was already yielded are skipped; items
/// without a key are always yielded. Seen keys are retained for the active
/// and immediately preceding window only: the window plan caps overlap
/// below the window width, and a key re-sighted in an overlap is refreshed
/// into the active generation, so nothing reachable by a later fetch is
/// ever evicted.
pub fn paginate_windows<T, E, F, Fut, K>(
    windows: WindowIter,
    fetch: F,
    key_fn: K,
) -> impl Stream<Item = Result<T, E>>
where
    F: FnMut(Window) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
    K: Fn(&T) -> Option<String>,
{
    stream::try_unfold(
        (windows, fetch, key_fn, SeenKeys::default()),
        |(mut windows, mut fetch, key_fn, mut seen)| async move {
            let Some(window) = windows.next() else {
                return Ok(None);
            };
            let items = fetch(window).await?;
            let fetched = items.len();
            let fresh: Vec<T> = items
                .into_iter()
                .filter(|item| key_fn(item).is_none_or(|key| seen.check_and_record(key)))
                .collect();
            debug!(window = %window, fetched, fresh = fresh.len(), "window fetched");
            seen.advance();
            Ok(Some((
                stream::iter(fresh.into_iter().map(Ok::<T, E>)),
                (windows, fetch, key_fn, seen),
            )))
        },
    )
    .try_flatten()
}

/// Extracts a dedup key from a raw JSON item.
#[must_use]
pub fn item_key(item: &Value) -> Option<String> {
    first_key_field(item, ITEM_KEY_FIELDS)
}

/// Extracts a last-id pagination pivot from a raw JSON item.
#[must_use]
pub fn pivot_key(item: &Value) -> Option<String> {
    first_key_field(item, PIVOT_KEY_FIELDS)
}

/// Extracts a single named identifier field from a raw JSON item, for
/// venues whose id field is not in the standard probe list.
#[must_use]
pub fn key_field(item: &Value, field: &str) -> Option<String> {
    first_key_field(item, &[field])
}

fn first_key_field(item: &Value, fields: &[&str]) -> Option<String> {
    let map = item.as_object()?;
    for field in fields {
        match map.get(*field) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Dedup memory spanning the active window generation and the one before.
#[derive(Debug, Default)]
struct SeenKeys {
    current: HashSet<String>,
    previous: HashSet<String>,
}

impl SeenKeys {
    /// Records a key, returning true if it is fresh. A key re-sighted from
    /// the previous generation is refreshed into the current one so it
    /// survives the next rollover.
    fn check_and_record(&mut self, key: String) -> bool {
        if self.current.contains(&key) {
            return false;
        }
        if self.previous.contains(&key) {
            self.current.insert(key);
            return false;
        }
        self.current.insert(key);
        true
    }

    /// Rolls the generations at a window boundary.
    fn advance(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use futures::StreamExt;
    use serde_json::json;
    use std::convert::Infallible;
    use zonda_types::{TimeRange, from_timestamp_ms};

    fn range_to(end_ms: i64) -> TimeRange {
        TimeRange::new(
            from_timestamp_ms(0).unwrap(),
            from_timestamp_ms(end_ms).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cursor_pagination_yields_pages_in_order() {
        let fetch = |cursor: Option<String>| async move {
            Ok::<_, Infallible>(match cursor.as_deref() {
                None => Page::new(vec![1, 2, 3], true, Some("c1".to_string())),
                Some("c1") => Page::new(vec![4, 5, 6], true, Some("c2".to_string())),
                Some("c2") => Page::last(vec![7, 8]),
                Some(other) => panic!("unexpected cursor {other}"),
            })
        };
        let items: Vec<i32> = paginate_cursor(fetch).try_collect().await.unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_cursor_pagination_stops_without_cursor() {
        let fetch = |cursor: Option<String>| async move {
            Ok::<_, Infallible>(match cursor {
                None => Page::new(vec![1], true, None),
                Some(_) => panic!("must not fetch again without a cursor"),
            })
        };
        let items: Vec<i32> = paginate_cursor(fetch).try_collect().await.unwrap();
        assert_eq!(items, vec![1]);
    }

    #[tokio::test]
    async fn test_cursor_pagination_is_lazy() {
        let fetch = |cursor: Option<String>| async move {
            Ok::<_, Infallible>(match cursor.as_deref() {
                None => Page::new(vec![1, 2, 3], true, Some("c1".to_string())),
                Some(_) => panic!("consumer stopped; no further pages may be fetched"),
            })
        };
        let items: Vec<Result<i32, Infallible>> = paginate_cursor(fetch).take(3).collect().await;
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_last_id_pagination_pivots_on_last_item() {
        let fetch = |last_id: Option<String>| async move {
            Ok::<_, Infallible>(match last_id.as_deref() {
                None => Page::new(
                    vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})],
                    true,
                    None,
                ),
                Some("3") => Page::new(
                    vec![json!({"id": 4}), json!({"id": 5}), json!({"id": 6})],
                    true,
                    None,
                ),
                Some("6") => Page::last(vec![json!({"id": 7}), json!({"id": 8})]),
                Some(other) => panic!("unexpected pivot {other}"),
            })
        };
        let items: Vec<Value> = paginate_last_id(fetch, pivot_key)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 8);
        assert_eq!(items[7], json!({"id": 8}));
    }

    #[tokio::test]
    async fn test_last_id_pagination_stops_without_pivot() {
        let fetch = |last_id: Option<String>| async move {
            Ok::<_, Infallible>(match last_id.as_deref() {
                None => Page::new(vec![json!({"id": 1})], true, None),
                // Claims more data, but offers nothing to pivot on.
                Some("1") => Page::new(vec![json!({"note": "no ids here"})], true, None),
                Some(other) => panic!("pagination should have stalled, got pivot {other}"),
            })
        };
        let items: Vec<Value> = paginate_last_id(fetch, pivot_key)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_window_pagination_dedups_overlap() {
        let windows = range_to(1_900)
            .windows_with_overlap(TimeDelta::milliseconds(1_000), TimeDelta::milliseconds(100))
            .unwrap();
        let fetch = |window: Window| async move {
            Ok::<_, Infallible>(match window.start_ms() {
                0 => vec![json!({"id": "1"}), json!({"id": "2"})],
                900 => vec![json!({"id": "2"}), json!({"id": "3"})],
                other => panic!("unexpected window start {other}"),
            })
        };
        let items: Vec<Value> = paginate_windows(windows, fetch, item_key)
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<&str> = items.iter().map(|v| v["id"].as_str().unwrap()).collect();
        // The boundary item re-fetched by the overlap appears exactly once.
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_window_pagination_keyless_items_always_yield() {
        let windows = range_to(2_000)
            .windows(TimeDelta::milliseconds(1_000))
            .unwrap();
        let fetch =
            |_: Window| async move { Ok::<_, Infallible>(vec![json!({"v": 1}), json!({"v": 1})]) };
        let items: Vec<Value> = paginate_windows(windows, fetch, item_key)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 4);
    }

    #[tokio::test]
    async fn test_window_dedup_refreshes_repeated_keys() {
        // The same key reported by all three windows is yielded only once,
        // even though retention spans just two window generations.
        let windows = range_to(2_800)
            .windows_with_overlap(TimeDelta::milliseconds(1_000), TimeDelta::milliseconds(100))
            .unwrap();
        let fetch = |window: Window| async move {
            Ok::<_, Infallible>(vec![json!({"id": "x", "window": window.start_ms()})])
        };
        let items: Vec<Value> = paginate_windows(windows, fetch, item_key)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["window"], 0);
    }

    #[test]
    fn test_key_extraction_fallback_order() {
        assert_eq!(
            item_key(&json!({"id": 9, "trade_id": "t"})),
            Some("9".to_string())
        );
        assert_eq!(item_key(&json!({"trade_id": "t-1"})), Some("t-1".to_string()));
        assert_eq!(item_key(&json!({"tx_hash": "0xabc"})), Some("0xabc".to_string()));
        assert_eq!(item_key(&json!({"note": "none"})), None);
        assert_eq!(item_key(&json!(42)), None);
        // Transaction hashes never serve as a pivot.
        assert_eq!(pivot_key(&json!({"tx_hash": "0xabc"})), None);
        assert_eq!(pivot_key(&json!({"order_id": 12})), Some("12".to_string()));
    }

    #[test]
    fn test_seen_keys_rollover() {
        let mut seen = SeenKeys::default();
        assert!(seen.check_and_record("a".to_string()));
        seen.advance();
        // Re-sighted from the previous generation: suppressed and refreshed.
        assert!(!seen.check_and_record("a".to_string()));
        seen.advance();
        assert!(!seen.check_and_record("a".to_string()));
        seen.advance();
        seen.advance();
        // Two quiet generations later the key has aged out.
        assert!(seen.check_and_record("a".to_string()));
    }
}
