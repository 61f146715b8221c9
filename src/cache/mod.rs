//! # Cache Module
//!
//! Small in-memory caches for data that is expensive to recompute.
//!
//! The only consumer today is source resolution: resolving a reference with
//! yt-dlp takes seconds, and a filter change restarts the same track, so the
//! resolved media URL is memoized for a short TTL (`RESOLVE_CACHE_TTL_SECS`).
//!
//! Direct media URLs handed out by YouTube expire after a few hours, so the
//! TTL should stay well below that.

pub mod ttl_cache;

pub use ttl_cache::TtlCache;
