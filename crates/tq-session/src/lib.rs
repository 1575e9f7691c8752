pub mod barrier;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod status;
pub mod surface;
pub mod transport;

pub use barrier::{CountingBarrier, WriteTicket};
pub use config::SessionConfig;
pub use error::SessionError;
pub use scheduler::OutputScheduler;
pub use session::{SessionCommand, SessionController, SessionHandle, TaskSnapshot, spawn};
pub use state::{ConnectionState, Transition};
pub use status::{SessionStatus, StatusBanner};
pub use surface::{SurfaceEvent, TerminalSize, TerminalSurface, VtSurface, convert_eol};
pub use transport::{Connection, Connector, TransportEvent, TransportPeer, WsConnector};
