//! Feed ranking and the cache-aside layer in front of it.

mod backend;
mod cache;
mod score;

pub use backend::{MemoryCache, RedisCache};
pub use cache::{CacheBackend, CacheError, FEED_KEY_PREFIX, FeedCache, FeedPage};
pub use score::{rank_page, score, score_at};
