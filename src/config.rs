use webrtc::ice_transport::ice_server::RTCIceServer;

pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8000";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_RELAY_BIND: &str = "0.0.0.0:8000";

/// Most participants a relay room admits; a full mesh grows quadratically.
pub const DEFAULT_MAX_USERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub signaling_url: String,
    pub room: String,
    pub ice_servers: Vec<String>,
}

impl ClientConfig {
    pub fn new(signaling_url: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            room: room.into(),
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }

    pub fn with_ice_servers(mut self, ice_servers: Vec<String>) -> Self {
        self.ice_servers = ice_servers;
        self
    }

    /// ICE servers in the form webrtc-rs expects. Blank entries are skipped.
    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        let urls: Vec<String> = self
            .ice_servers
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
            .collect();

        if urls.is_empty() {
            return Vec::new();
        }
        vec![RTCIceServer {
            urls,
            ..Default::default()
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_public_stun() {
        let config = ClientConfig::new(DEFAULT_SIGNALING_URL, "room1");
        let servers = config.rtc_ice_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec![DEFAULT_STUN_SERVER.to_string()]);
    }

    #[test]
    fn blank_ice_servers_disable_ice_servers() {
        let config = ClientConfig::new(DEFAULT_SIGNALING_URL, "room1")
            .with_ice_servers(vec![" ".to_string()]);
        assert!(config.rtc_ice_servers().is_empty());
    }
}
