pub mod admin;
pub mod videos;
