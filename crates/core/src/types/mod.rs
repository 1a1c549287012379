pub mod at_uri;
pub mod backoff;
