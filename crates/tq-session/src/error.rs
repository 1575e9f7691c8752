use thiserror::Error;
use tq_protocol::frame::FrameError;

use crate::state::{ConnectionState, Transition};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("illegal transition: {via} while {from}")]
    IllegalTransition {
        from: ConnectionState,
        via: Transition,
    },

    #[error("outbound queue full")]
    OutboundFull,

    #[error("socket closed")]
    SocketClosed,

    #[error("session stopped")]
    Stopped,

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
