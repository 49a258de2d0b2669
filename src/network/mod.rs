pub mod command;
pub mod connection;
pub mod subscriber;

pub use command::CommandClient;
pub use connection::Frame;
pub use subscriber::{ConnectionState, FeedSubscriber, Subscriber};
