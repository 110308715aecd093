#![forbid(unsafe_code)]

use std::sync::Arc;

use flagdesk_kernel_contracts::session::{ListKind, ListSnapshot, SnapshotId};
use flagdesk_kernel_contracts::TimestampMs;
use sha2::{Digest, Sha256};

const SNAPSHOT_ID_HEX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    pub page_size: u32,
    pub audit_page_size: u32,
}

impl PaginationConfig {
    pub fn mvp_v1() -> Self {
        Self {
            page_size: 10,
            audit_page_size: 20,
        }
    }

    pub fn page_size_for(&self, kind: ListKind) -> u32 {
        match kind {
            ListKind::SubmissionAudit => self.audit_page_size,
            ListKind::Leaderboard | ListKind::RegisteredUsers | ListKind::Solvers => {
                self.page_size
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    #[error("page size must be > 0")]
    ZeroPageSize,
    #[error("list is empty")]
    EmptyList,
    #[error("page {page} is out of range ({page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },
}

/// Half-open slice `[start, end)` of a cached list plus its navigation controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub start: usize,
    pub end: usize,
    pub total: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

pub fn page_count(total: usize, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let size = page_size as usize;
    u32::try_from(total.div_ceil(size)).unwrap_or(u32::MAX)
}

pub fn page_window(total: usize, page: u32, page_size: u32) -> Result<PageWindow, PaginationError> {
    if page_size == 0 {
        return Err(PaginationError::ZeroPageSize);
    }
    if total == 0 {
        return Err(PaginationError::EmptyList);
    }
    let size = page_size as usize;
    let start = (page as usize).saturating_mul(size);
    if start >= total {
        return Err(PaginationError::PageOutOfRange {
            page,
            page_count: page_count(total, page_size),
        });
    }
    let end = start.saturating_add(size).min(total);
    Ok(PageWindow {
        page,
        start,
        end,
        total,
        has_prev: page > 0,
        has_next: (page as usize + 1).saturating_mul(size) < total,
    })
}

/// Content-derived id; page turns must echo it so a stale or foreign snapshot is detected.
pub fn snapshot_id_for(
    kind: ListKind,
    title: &str,
    items: &[String],
    captured_at: TimestampMs,
) -> SnapshotId {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(captured_at.as_millis().to_be_bytes());
    for item in items {
        hasher.update((item.len() as u64).to_be_bytes());
        hasher.update(item.as_bytes());
    }
    let digest = hasher.finalize();
    let hex = digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    SnapshotId(hex[..SNAPSHOT_ID_HEX_LEN].to_string())
}

pub fn capture_snapshot(
    kind: ListKind,
    title: impl Into<String>,
    items: Vec<String>,
    captured_at: TimestampMs,
) -> ListSnapshot {
    let title = title.into();
    let snapshot_id = snapshot_id_for(kind, &title, &items, captured_at);
    ListSnapshot {
        snapshot_id,
        kind,
        title,
        items: Arc::from(items),
        captured_at,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage<'a> {
    pub title: &'a str,
    pub lines: &'a [String],
    pub window: PageWindow,
}

/// Re-slices a cached snapshot. Never queries the store.
pub fn render_page(
    snapshot: &ListSnapshot,
    page: u32,
    page_size: u32,
) -> Result<RenderedPage<'_>, PaginationError> {
    let window = page_window(snapshot.len(), page, page_size)?;
    Ok(RenderedPage {
        title: &snapshot.title,
        lines: &snapshot.items[window.start..window.end],
        window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("item {i}")).collect()
    }

    #[test]
    fn at_page_01_twenty_five_items_three_pages() {
        let snap = capture_snapshot(ListKind::Leaderboard, "Leaderboard", items(25), TimestampMs(1));

        let p0 = render_page(&snap, 0, 10).unwrap();
        assert_eq!(p0.lines.first().unwrap(), "item 1");
        assert_eq!(p0.lines.last().unwrap(), "item 10");
        assert!(!p0.window.has_prev);
        assert!(p0.window.has_next);

        let p1 = render_page(&snap, 1, 10).unwrap();
        assert_eq!(p1.lines.first().unwrap(), "item 11");
        assert_eq!(p1.lines.last().unwrap(), "item 20");
        assert!(p1.window.has_prev);
        assert!(p1.window.has_next);

        let p2 = render_page(&snap, 2, 10).unwrap();
        assert_eq!(p2.lines.len(), 5);
        assert_eq!(p2.lines.last().unwrap(), "item 25");
        assert!(p2.window.has_prev);
        assert!(!p2.window.has_next);
    }

    #[test]
    fn at_page_02_exact_multiple_has_no_trailing_next() {
        let w = page_window(20, 1, 10).unwrap();
        assert!(!w.has_next);
        assert_eq!(page_count(20, 10), 2);
        assert_eq!(page_count(21, 10), 3);
    }

    #[test]
    fn at_page_03_out_of_range_and_empty_fail_closed() {
        assert_eq!(
            page_window(25, 3, 10),
            Err(PaginationError::PageOutOfRange {
                page: 3,
                page_count: 3
            })
        );
        assert_eq!(page_window(0, 0, 10), Err(PaginationError::EmptyList));
        assert_eq!(page_window(5, 0, 0), Err(PaginationError::ZeroPageSize));
    }

    #[test]
    fn at_page_04_snapshot_id_tracks_content() {
        let a = snapshot_id_for(ListKind::Leaderboard, "t", &items(3), TimestampMs(5));
        let b = snapshot_id_for(ListKind::Leaderboard, "t", &items(3), TimestampMs(5));
        let c = snapshot_id_for(ListKind::Leaderboard, "t", &items(4), TimestampMs(5));
        let d = snapshot_id_for(ListKind::RegisteredUsers, "t", &items(3), TimestampMs(5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.as_str().len(), SNAPSHOT_ID_HEX_LEN);
    }

    #[test]
    fn at_page_05_audit_log_uses_larger_pages() {
        let cfg = PaginationConfig::mvp_v1();
        assert_eq!(cfg.page_size_for(ListKind::SubmissionAudit), 20);
        assert_eq!(cfg.page_size_for(ListKind::Leaderboard), 10);
        assert_eq!(cfg.page_size_for(ListKind::Solvers), 10);
    }
}
