use crate::facility::ChannelId;

#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("unknown channel `{0}`")]
    UnknownChannel(ChannelId),
    #[error("channel `{0}` is closed")]
    Closed(ChannelId),
    #[error("channel `{0}` is already open")]
    Duplicate(ChannelId),
    #[error("channel limit of {0} reached")]
    LimitReached(usize),
    #[error("channel setup failed: {0}")]
    Setup(String),
}
