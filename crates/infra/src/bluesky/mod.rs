mod client;
mod notification_scan;
mod thread_walk;
mod types;

pub use client::{BlueskyClient, BlueskyCredentials, BlueskyError};
pub use notification_scan::NotificationScanSource;
pub use thread_walk::{MAX_THREAD_DEPTH, ThreadWalkSource};
