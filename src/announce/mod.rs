//! Social announcements: composition, channel clients, and dispatch.
//!
//! The composer decides what gets queued under the per-channel rate policy
//! and builds the message text; the dispatcher drains the durable queue one
//! announcement per tick. The split matters: composing reserves the
//! announcement slot (counter bump + enqueue in one transaction), while
//! dispatch is fire-and-forget against external APIs.

mod channels;
mod composer;
mod dispatcher;

pub use channels::{Channel, ChannelError, ChannelSet, MastodonClient, TwitterClient};
pub use composer::{
    compose_article_announcements, compose_blog_announcements, needs_announcing, ResolvedAuthors,
};
pub use dispatcher::dispatch_tick;
