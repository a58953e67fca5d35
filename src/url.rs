use url::{Host, Position, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ws,
    Wss,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    pub scheme: Scheme,
    /// Host without IPv6 brackets.
    pub host: String,
    pub port: u16,
    pub path_and_query: String,
}

impl WsUrl {
    /// Value for the `Host` request header; the port is omitted when it is
    /// the scheme default.
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum UrlError {
    #[error(transparent)]
    Parse(#[from] url::ParseError),
    #[error("URL must start with ws:// or wss://")]
    Scheme,
    #[error("missing host")]
    Host,
}

pub fn parse_ws_or_wss(input: &str) -> Result<WsUrl, UrlError> {
    let url = Url::parse(input)?;
    let scheme = match url.scheme() {
        "ws" => Scheme::Ws,
        "wss" => Scheme::Wss,
        _ => return Err(UrlError::Scheme),
    };

    let host = match url.host().ok_or(UrlError::Host)? {
        Host::Domain(domain) => domain.to_owned(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };
    let port = url
        .port_or_known_default()
        .unwrap_or_else(|| scheme.default_port());
    // The fragment never goes on the wire.
    let path_and_query = url[Position::BeforePath..Position::AfterQuery].to_owned();

    Ok(WsUrl {
        scheme,
        host,
        port,
        path_and_query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_port_and_path() {
        let u = parse_ws_or_wss("ws://example.com").unwrap();
        assert_eq!(u.scheme, Scheme::Ws);
        assert_eq!(u.host, "example.com");
        assert_eq!(u.port, 80);
        assert_eq!(u.path_and_query, "/");
        assert_eq!(u.host_header(), "example.com");

        let u = parse_ws_or_wss("wss://example.com/feed?x=1").unwrap();
        assert_eq!(u.port, 443);
        assert_eq!(u.path_and_query, "/feed?x=1");
    }

    #[test]
    fn explicit_port() {
        let u = parse_ws_or_wss("wss://stream.example.com:9443/ws/trades").unwrap();
        assert_eq!(u.host, "stream.example.com");
        assert_eq!(u.port, 9443);
        assert_eq!(u.path_and_query, "/ws/trades");
        assert_eq!(u.host_header(), "stream.example.com:9443");

        let u = parse_ws_or_wss("ws://example.com:80/").unwrap();
        assert_eq!(u.port, 80);
        assert_eq!(u.host_header(), "example.com");
    }

    #[test]
    fn host_is_normalized_and_fragment_dropped() {
        let u = parse_ws_or_wss("wss://Example.COM/Chat?room=1#top").unwrap();
        assert_eq!(u.host, "example.com");
        assert_eq!(u.path_and_query, "/Chat?room=1");
    }

    #[test]
    fn ipv6_host() {
        let u = parse_ws_or_wss("ws://[::1]:9001/chat").unwrap();
        assert_eq!(u.host, "::1");
        assert_eq!(u.port, 9001);
        assert_eq!(u.host_header(), "[::1]:9001");

        let u = parse_ws_or_wss("wss://[fe80::1]").unwrap();
        assert_eq!(u.port, 443);
        assert_eq!(u.host_header(), "[fe80::1]");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_ws_or_wss("http://x").unwrap_err(), UrlError::Scheme);
        assert!(matches!(
            parse_ws_or_wss("ws://x:notaport/").unwrap_err(),
            UrlError::Parse(url::ParseError::InvalidPort)
        ));
        assert!(matches!(parse_ws_or_wss("ws://").unwrap_err(), UrlError::Parse(_)));
        assert!(matches!(parse_ws_or_wss("example.com").unwrap_err(), UrlError::Parse(_)));
    }
}
