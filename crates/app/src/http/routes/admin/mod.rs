pub mod comments_sync;
