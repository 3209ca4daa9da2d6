pub mod collections;
pub mod comments;
pub mod feed;
pub mod likes;
