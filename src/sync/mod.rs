pub mod backlinks;
pub mod debounce;
pub mod pages;
pub mod references;

pub use backlinks::{find_backlinks, BacklinkGroup, BacklinkRef, BacklinkScope, Backlinks};
pub use debounce::Debouncer;
pub use pages::{
    daily_notes, daily_title, get_or_create_by_title, open_daily_note, suggest_blocks,
    suggest_pages, DailyNote,
};
pub use references::{
    apply_diff, diff_references, extract_references, write_value, ReferenceDiff, ReferenceTarget,
    ReferenceTracker,
};
