mod client;

pub use client::{SIGNATURE_HEADER, ShimClient, ShimError, sign_body};
