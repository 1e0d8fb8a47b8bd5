mod articles;
mod blogs;
mod queue;
mod schema;
mod subscribers;
mod types;

pub use schema::Database;
pub use types::{
    Article, Blog, ChannelKind, ChannelState, DatabaseError, NewAnnouncement, NewArticle,
    QueuedAnnouncement, Subscriber,
};
