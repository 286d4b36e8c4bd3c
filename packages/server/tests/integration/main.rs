mod admin;
mod common;
mod videos;
