use anyhow::{Context, Result, anyhow};
use native_tls::{Protocol, TlsConnector};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::net::TcpStream;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::document::SettingsDocument;
use crate::core::values::parse_list;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("unsupported fingerprint algorithm in '{value}' (expected sha1, sha256 or sha512)")]
    UnsupportedAlgorithm { value: String },

    #[error("invalid fingerprint '{value}': {reason}")]
    InvalidFormat { value: String, reason: String },

    #[error("unsupported minimum protocol '{value}' (expected tls1.0, tls1.1 or tls1.2)")]
    InvalidProtocol { value: String },

    #[error("certificate for {host} has unexpected fingerprint {actual} (expected {})", .expected.join(", "))]
    Mismatch {
        host: String,
        expected: Vec<String>,
        actual: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(()),
        }
    }
}

/// A pinned certificate digest, such as `sha256:32:12:90:...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub algorithm: DigestAlgorithm,
    pub digest: Vec<u8>,
}

impl Fingerprint {
    /// Parses `alg:hex`, where the hex digits may be grouped by colons and use
    /// either case.
    pub fn parse(value: &str) -> Result<Self, FingerprintError> {
        let Some((alg, hex_part)) = value.trim().split_once(':') else {
            return Err(FingerprintError::InvalidFormat {
                value: value.to_string(),
                reason: "expected '<algorithm>:<hex digest>'".to_string(),
            });
        };
        let algorithm = alg
            .parse::<DigestAlgorithm>()
            .map_err(|_| FingerprintError::UnsupportedAlgorithm {
                value: value.to_string(),
            })?;
        Self::from_hex(algorithm, hex_part, value)
    }

    /// Parses a legacy `[hostfingerprints]` value: bare SHA-1 hex.
    pub fn parse_legacy(value: &str) -> Result<Self, FingerprintError> {
        Self::from_hex(DigestAlgorithm::Sha1, value.trim(), value)
    }

    fn from_hex(algorithm: DigestAlgorithm, hex_part: &str, original: &str) -> Result<Self, FingerprintError> {
        let compact: String = hex_part.chars().filter(|c| *c != ':').collect();
        let digest = hex::decode(compact.to_ascii_lowercase()).map_err(|e| FingerprintError::InvalidFormat {
            value: original.to_string(),
            reason: e.to_string(),
        })?;
        if digest.len() != algorithm.digest_len() {
            return Err(FingerprintError::InvalidFormat {
                value: original.to_string(),
                reason: format!(
                    "{} digests are {} bytes, got {}",
                    algorithm.name(),
                    algorithm.digest_len(),
                    digest.len()
                ),
            });
        }
        Ok(Self { algorithm, digest })
    }

    pub fn of_certificate(algorithm: DigestAlgorithm, der: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(der),
        }
    }

    pub fn matches(&self, der: &[u8]) -> bool {
        self.algorithm.digest(der) == self.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self.digest.iter().map(|b| hex::encode([*b])).collect();
        write!(f, "{}:{}", self.algorithm.name(), groups.join(":"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MinimumProtocol {
    Tls10,
    Tls11,
    Tls12,
}

impl FromStr for MinimumProtocol {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls1.0" => Ok(MinimumProtocol::Tls10),
            "tls1.1" => Ok(MinimumProtocol::Tls11),
            "tls1.2" => Ok(MinimumProtocol::Tls12),
            _ => Err(FingerprintError::InvalidProtocol { value: s.to_string() }),
        }
    }
}

impl fmt::Display for MinimumProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MinimumProtocol::Tls10 => "tls1.0",
            MinimumProtocol::Tls11 => "tls1.1",
            MinimumProtocol::Tls12 => "tls1.2",
        };
        f.write_str(name)
    }
}

impl From<MinimumProtocol> for Protocol {
    fn from(value: MinimumProtocol) -> Self {
        match value {
            MinimumProtocol::Tls10 => Protocol::Tlsv10,
            MinimumProtocol::Tls11 => Protocol::Tlsv11,
            MinimumProtocol::Tls12 => Protocol::Tlsv12,
        }
    }
}

/// Security settings for one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPolicy {
    pub fingerprints: Vec<Fingerprint>,
    pub minimum_protocol: Option<MinimumProtocol>,
    /// The pins came from `[hostfingerprints]` rather than `[hostsecurity]`.
    pub legacy: bool,
}

/// Outcome of checking a peer certificate against the configured pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// A configured fingerprint matched.
    Pinned(Fingerprint),
    /// No fingerprint is configured for the host; trust is left to the
    /// TLS library's certificate chain validation.
    Unpinned,
}

/// The `[hostsecurity]` section (and legacy `[hostfingerprints]`) in typed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSecurity {
    pub minimum_protocol: MinimumProtocol,
    hosts: Vec<(String, HostPolicy)>,
}

impl Default for HostSecurity {
    fn default() -> Self {
        Self {
            minimum_protocol: MinimumProtocol::Tls12,
            hosts: Vec::new(),
        }
    }
}

impl HostSecurity {
    pub fn from_document(doc: &SettingsDocument) -> Result<Self, FingerprintError> {
        let mut security = HostSecurity::default();

        for (key, value) in doc.items("hostsecurity") {
            let Some((host, option)) = key.rsplit_once(':') else {
                match key {
                    "minimumprotocol" => security.minimum_protocol = value.parse()?,
                    _ => debug!(key, "ignoring hostsecurity option"),
                }
                continue;
            };
            match option {
                "fingerprints" => {
                    let pins = parse_list(value)
                        .iter()
                        .map(|v| Fingerprint::parse(v))
                        .collect::<Result<Vec<_>, _>>()?;
                    security.policy_mut(host).fingerprints = pins;
                }
                "minimumprotocol" => {
                    security.policy_mut(host).minimum_protocol = Some(value.parse()?);
                }
                _ => debug!(host, option, "ignoring hostsecurity option"),
            }
        }

        for (host, value) in doc.items("hostfingerprints") {
            if security.policy(host).is_some_and(|p| !p.fingerprints.is_empty()) {
                debug!(host, "hostsecurity pins take precedence over hostfingerprints");
                continue;
            }
            let pins = parse_list(value)
                .iter()
                .map(|v| Fingerprint::parse_legacy(v))
                .collect::<Result<Vec<_>, _>>()?;
            let policy = security.policy_mut(host);
            policy.fingerprints = pins;
            policy.legacy = true;
        }

        Ok(security)
    }

    fn policy_mut(&mut self, host: &str) -> &mut HostPolicy {
        let host = host.to_ascii_lowercase();
        let index = match self.hosts.iter().position(|(h, _)| *h == host) {
            Some(i) => i,
            None => {
                self.hosts.push((host, HostPolicy::default()));
                self.hosts.len() - 1
            }
        };
        &mut self.hosts[index].1
    }

    pub fn policy(&self, host: &str) -> Option<&HostPolicy> {
        let host = host.to_ascii_lowercase();
        self.hosts.iter().find(|(h, _)| *h == host).map(|(_, p)| p)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&str, &HostPolicy)> {
        self.hosts.iter().map(|(h, p)| (h.as_str(), p))
    }

    pub fn pins(&self, host: &str) -> &[Fingerprint] {
        self.policy(host).map(|p| p.fingerprints.as_slice()).unwrap_or(&[])
    }

    pub fn minimum_protocol_for(&self, host: &str) -> MinimumProtocol {
        self.policy(host)
            .and_then(|p| p.minimum_protocol)
            .unwrap_or(self.minimum_protocol)
    }

    /// Checks a peer certificate (DER bytes) against the pins for `host`.
    ///
    /// When pins exist, one of them must match. A mismatch is always an error;
    /// it never falls back to chain validation.
    pub fn verify(&self, host: &str, der: &[u8]) -> Result<Verification, FingerprintError> {
        let pins = self.pins(host);
        let Some(first) = pins.first() else {
            return Ok(Verification::Unpinned);
        };
        if let Some(pin) = pins.iter().find(|p| p.matches(der)) {
            return Ok(Verification::Pinned(pin.clone()));
        }
        Err(FingerprintError::Mismatch {
            host: host.to_string(),
            expected: pins.iter().map(ToString::to_string).collect(),
            actual: Fingerprint::of_certificate(first.algorithm, der).to_string(),
        })
    }
}

/// Connects to `host:port`, reads the peer certificate and verifies it.
///
/// With pins configured for the host, CA and hostname validation are turned
/// off and the pin is the only trust anchor. Returns the observed SHA-256
/// fingerprint together with the verification outcome.
pub fn probe_host(host: &str, port: u16, security: &HostSecurity) -> Result<(Fingerprint, Verification)> {
    let pinned = !security.pins(host).is_empty();
    let minimum = security.minimum_protocol_for(host);

    let mut builder = TlsConnector::builder();
    builder.min_protocol_version(Some(minimum.into()));
    if pinned {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    let connector = builder.build().context("Failed to build TLS connector")?;

    info!(host, port, %minimum, pinned, "connecting");
    let stream = TcpStream::connect((host, port)).with_context(|| format!("Failed to connect to {host}:{port}"))?;
    let tls = connector
        .connect(host, stream)
        .map_err(|e| anyhow!("TLS handshake with {host}:{port} failed: {e}"))?;

    let certificate = tls
        .peer_certificate()
        .context("Failed to read peer certificate")?
        .ok_or_else(|| anyhow!("{host} did not present a certificate"))?;
    let der = certificate.to_der().context("Failed to encode peer certificate")?;
    let observed = Fingerprint::of_certificate(DigestAlgorithm::Sha256, &der);

    match security.verify(host, &der) {
        Ok(verification) => Ok((observed, verification)),
        Err(e) => {
            warn!(host, %observed, "aborting connection on fingerprint mismatch");
            Err(e.into())
        }
    }
}
