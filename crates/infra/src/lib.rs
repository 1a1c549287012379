pub mod bluesky;
pub mod db;
pub mod shim;
