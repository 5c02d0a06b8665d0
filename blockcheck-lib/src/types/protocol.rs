use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, VariantNames};

/// Protocol family a probe (and the matching engine filter) runs over.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP over TCP port 80
    Http,
    /// HTTPS over TCP port 443 (TLS 1.2 or 1.3)
    Https,
    /// HTTP/3 over QUIC on UDP port 443
    Http3,
}

impl Protocol {
    /// Conventional port probed for this protocol
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https | Protocol::Http3 => 443,
        }
    }

    /// URL scheme used when probing
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https | Protocol::Http3 => "https",
        }
    }

    /// The windivert filter arguments the engine needs to intercept this
    /// protocol's traffic
    #[must_use]
    pub fn filter_args(self) -> Vec<String> {
        let filter = match self {
            Protocol::Http => "--wf-tcp=80",
            Protocol::Https => "--wf-tcp=443",
            Protocol::Http3 => "--wf-udp=443",
        };
        vec!["--wf-l3=ipv4".to_string(), filter.to_string()]
    }
}

/// TLS version constraint for HTTPS probes.
///
/// `V1_2` pins the handshake to exactly TLS 1.2; `V1_3` requires at least
/// TLS 1.3. DPI middleboxes often treat the two very differently because
/// TLS 1.3 encrypts more of the handshake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[non_exhaustive]
pub enum TlsVersion {
    #[serde(rename = "TLSv1_2")]
    #[strum(serialize = "TLSv1_2")]
    V1_2,
    #[serde(rename = "TLSv1_3")]
    #[strum(serialize = "TLSv1_3")]
    V1_3,
}

impl From<TlsVersion> for reqwest::tls::Version {
    fn from(ver: TlsVersion) -> Self {
        match ver {
            TlsVersion::V1_2 => reqwest::tls::Version::TLS_1_2,
            TlsVersion::V1_3 => reqwest::tls::Version::TLS_1_3,
        }
    }
}
