//! CalDAV calendar adapter for asana2calendar.
//!
//! Events are read with a calendar-query REPORT and written as one `.ics`
//! resource per event. The resource href is the native id.

mod adapter;
pub mod caldav;
pub mod ics;

pub use adapter::CalDavAdapter;

/// Registry kind for this adapter.
pub const KIND: &str = "caldav";
