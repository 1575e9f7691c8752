use std::time::Duration;

/// Runtime knobs for one live-log session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Keep-alive period while the socket is open.
    pub ping_interval: Duration,
    /// Swap `\r` and `\n` in outgoing keystrokes.
    pub remap_newline: bool,
    /// Bounded capacity of the outbound and inbound socket channels.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            remap_newline: false,
            channel_capacity: 256,
        }
    }
}
