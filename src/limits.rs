//! Hard limits. Requests beyond these fail validation (or are clamped where
//! noted) instead of growing memory or scan time without bound.

pub const MAX_TITLE_LEN: usize = 512;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_PARTICIPANTS_PER_MEETING: usize = 256;

/// Upper bound on busy meetings visited plus slots cut by one alternative search.
pub const MAX_SLOT_SCAN_STEPS: usize = 10_000;

/// Config values above these are clamped.
pub const MAX_SEARCH_HORIZON_HOURS: i64 = 24 * 366;
pub const MAX_ALTERNATIVES: usize = 50;

pub const MIN_PAGE: usize = 1;
pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 100;

/// Longest accepted request line on the wire, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;
