//! # UI Module
//!
//! Embed builders for command replies. Everything here renders from a
//! [`SessionSnapshot`](crate::audio::SessionSnapshot) or stored history, so
//! the views never re-derive playback timing on their own.

pub mod embeds;
