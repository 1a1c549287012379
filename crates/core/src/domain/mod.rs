pub mod comments;
pub mod links;
