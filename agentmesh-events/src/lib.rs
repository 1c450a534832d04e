//! agentmesh Events - Directory Event Feed
//!
//! Every directory mutation is published to an [`EventFeed`]. Subscribers
//! receive every event published after they subscribed, in publication
//! order, exactly once. There is no replay of history.
//!
//! # Architecture
//!
//! ```text
//! publish() ──┐
//!             ├──> ingress (unbounded, FIFO) ──> fan-out task ──> bounded queue ──> subscriber A
//! subscribe()─┘                                               └─> bounded queue ──> subscriber B
//! ```
//!
//! Publishing never blocks: the directory only pushes onto the ingress
//! channel. A single fan-out task owns the subscriber list, so publication
//! is serialized and every subscriber observes the same order. A subscriber
//! whose queue is full is disconnected instead of silently missing events.

mod feed;

pub use feed::{EventFeed, EventSubscription, FeedStats, SubscriberId};

pub use agentmesh_core::{DirectoryEvent, EventFeedConfig};
