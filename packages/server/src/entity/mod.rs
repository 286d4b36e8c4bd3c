pub mod storage_account;
pub mod video;
pub mod video_like;
pub mod watch_session;
