//! HTTPS policy and the rustls client configuration derived from it.

use anyhow::{Context, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which certificate problems the fetcher tolerates. Expired certificates
/// are never tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HttpsOptions {
    pub enabled: bool,
    pub allow_self_signed: bool,
    pub allow_unknown_ca: bool,
    pub allow_not_yet_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid https option {0:?}")]
pub struct InvalidHttpsOption(pub String);

impl FromStr for HttpsOptions {
    type Err = InvalidHttpsOption;

    /// Parses `enable,allow_self_signed,allow_unknown_certificate_authority,
    /// allow_certificate_not_yet_valid` or `disable`, in any combination.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut opts = HttpsOptions::default();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "enable" => opts.enabled = true,
                "disable" => opts.enabled = false,
                "allow_self_signed" => opts.allow_self_signed = true,
                "allow_unknown_certificate_authority" => opts.allow_unknown_ca = true,
                "allow_certificate_not_yet_valid" => opts.allow_not_yet_valid = true,
                other => return Err(InvalidHttpsOption(other.to_string())),
            }
        }
        Ok(opts)
    }
}

impl HttpsOptions {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Hostname checks are skipped when the issuer cannot be trusted anyway.
    pub fn enforces_hostname(&self) -> bool {
        !(self.allow_self_signed || self.allow_unknown_ca)
    }
}

/// Certificate problem classes the policy reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CertProblem {
    UnknownIssuer,
    NotValidYet,
    NotValidForName,
    Other,
}

fn classify(err: &CertificateError) -> CertProblem {
    // Newer rustls versions add context-carrying variants that share the
    // base variant's name as prefix.
    let name = format!("{err:?}");
    if name.starts_with("UnknownIssuer") {
        CertProblem::UnknownIssuer
    } else if name.starts_with("NotValidYet") {
        CertProblem::NotValidYet
    } else if name.starts_with("NotValidForName") {
        CertProblem::NotValidForName
    } else {
        CertProblem::Other
    }
}

/// WebPKI verification with the configured problems forgiven.
#[derive(Debug)]
struct PolicyVerifier {
    inner: Arc<WebPkiServerVerifier>,
    options: HttpsOptions,
}

impl PolicyVerifier {
    fn tolerates(&self, problem: CertProblem, self_signed: bool) -> bool {
        match problem {
            CertProblem::UnknownIssuer => {
                self.options.allow_unknown_ca || (self.options.allow_self_signed && self_signed)
            }
            CertProblem::NotValidYet => self.options.allow_not_yet_valid,
            CertProblem::NotValidForName => !self.options.enforces_hostname(),
            CertProblem::Other => false,
        }
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(v) => Ok(v),
            Err(rustls::Error::InvalidCertificate(cert_err)) => {
                let self_signed = intermediates.is_empty();
                if self.tolerates(classify(&cert_err), self_signed) {
                    debug!(
                        component = "tls",
                        event = "certificate_problem_ignored",
                        server = ?server_name,
                        problem = ?cert_err
                    );
                    Ok(ServerCertVerified::assertion())
                } else {
                    Err(rustls::Error::InvalidCertificate(cert_err))
                }
            }
            Err(e) => Err(e),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn load_pem_certs(path: &Path, store: &mut RootCertStore) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("open certificate file {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        match cert {
            Ok(cert) => match store.add(cert) {
                Ok(()) => added += 1,
                Err(e) => warn!(
                    component = "tls",
                    event = "bad_certificate",
                    path = ?path,
                    error = %e,
                    "skipping certificate"
                ),
            },
            Err(e) => warn!(
                component = "tls",
                event = "bad_pem_item",
                path = ?path,
                error = %e,
                "skipping PEM element"
            ),
        }
    }
    Ok(added)
}

/// Trust anchors: the configured file and/or directory when given, otherwise
/// the platform store, otherwise the bundled Mozilla roots.
pub fn load_root_store(
    certificates_file: Option<&Path>,
    certificates_dir: Option<&Path>,
) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    if let Some(file) = certificates_file {
        load_pem_certs(file, &mut store)?;
    }
    if let Some(dir) = certificates_dir {
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("read certificate dir {:?}", dir))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Err(e) = load_pem_certs(&path, &mut store) {
                    warn!(component = "tls", event = "cert_file_skipped", error = %e);
                }
            }
        }
    }
    if certificates_file.is_none() && certificates_dir.is_none() {
        match rustls_native_certs::load_native_certs() {
            Ok(certs) => {
                let (added, ignored) = store.add_parsable_certificates(certs);
                debug!(component = "tls", event = "native_roots", added, ignored);
            }
            Err(e) => warn!(
                component = "tls",
                event = "native_roots_failed",
                error = %e,
                "failed to load platform certificates, continuing with bundled roots"
            ),
        }
    }
    if store.is_empty() {
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    Ok(store)
}

/// Builds the client TLS configuration enforcing `options`.
pub fn build_client_config(options: HttpsOptions, roots: RootCertStore) -> Result<ClientConfig> {
    let provider: Arc<CryptoProvider> = Arc::new(rustls::crypto::ring::default_provider());
    let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .context("build certificate verifier")?;
    let verifier = Arc::new(PolicyVerifier { inner, options });
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("select TLS protocol versions")?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok(config)
}

/// Finds a certificate rejection anywhere in an error chain and describes it.
pub fn certificate_error(err: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cur {
        if let Some(msg) = as_certificate_error(e) {
            return Some(msg);
        }
        // io::Error::source() skips the wrapped error itself.
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(msg) = io.get_ref().and_then(|inner| as_certificate_error(inner)) {
                return Some(msg);
            }
        }
        cur = e.source();
    }
    None
}

fn as_certificate_error(e: &(dyn std::error::Error + 'static)) -> Option<String> {
    match e.downcast_ref::<rustls::Error>() {
        Some(rustls::Error::InvalidCertificate(c)) => Some(format!("{c:?}")),
        _ => None,
    }
}
