//! Content-negotiated retrieval of DOI metadata from a resolver.

use std::time::Duration;

use log::{debug, trace, warn};
use url::Url;

use crate::{
    error::{Error, Result},
    identifier::{DEFAULT_RESOLVER_DOMAIN, Doi},
    item::MetadataRecord,
    translator::{self, CSL_JSON, Format, UNIXREF_XML},
};

/// Redirect statuses whose `Location` is reported by [`Resolver::resolve_target`].
const REDIRECT_CODES: [u16; 3] = [301, 302, 303];

const MAX_REDIRECTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub domain: String,
    /// Upper bound on a whole request, redirects included.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            domain: DEFAULT_RESOLVER_DOMAIN.to_string(),
            timeout: Duration::from_secs(10),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    /// Value of the `Accept` header, if any.
    pub accept: Option<String>,
    pub follow_redirects: bool,
    pub user_agent: String,
}

/// The final response of a request. When redirects were followed, everything here describes
/// the last hop.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub location: Option<String>,
    pub body: String,
}

/// Something that can perform a single HTTP GET.
///
/// Non-2xx statuses are ordinary responses. Only failures to get any response at all (DNS,
/// connection, timeouts, unreadable bodies) are errors.
pub trait Transport: Send + Sync {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: &ResolverConfig) -> Self {
        let cfg = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build();
        UreqTransport {
            agent: ureq::Agent::new_with_config(cfg),
        }
    }
}

fn transport_error(url: &Url, source: ureq::Error) -> Error {
    Error::Transport {
        url: url.to_string(),
        source: Box::new(source),
    }
}

impl Transport for UreqTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = &request.url;
        let mut req = self
            .agent
            .get(url.as_str())
            .header("User-Agent", request.user_agent.as_str());
        if let Some(accept) = &request.accept {
            req = req.header("Accept", accept.as_str());
        }
        let redirects = if request.follow_redirects {
            MAX_REDIRECTS
        } else {
            0
        };
        let mut res = req
            .config()
            .max_redirects(redirects)
            .max_redirects_will_error(false)
            .build()
            .call()
            .map_err(|e| transport_error(url, e))?;

        let header = |name: &str| {
            res.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let content_type = header("content-type");
        let location = header("location");
        let status = res.status().as_u16();
        let body = res
            .body_mut()
            .read_to_string()
            .map_err(|e| transport_error(url, e))?;
        Ok(HttpResponse {
            status,
            content_type,
            location,
            body,
        })
    }
}

/// Outcome of a metadata request that got an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    Found { body: String, content_type: String },
    /// The resolver answered with something other than 200.
    NotFound { status: u16 },
}

pub struct Resolver {
    config: ResolverConfig,
    backend: Option<Box<dyn Transport>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new(ResolverConfig::default())
    }
}

impl Resolver {
    /// A resolver that talks HTTP through ureq.
    pub fn new(config: ResolverConfig) -> Self {
        let backend = UreqTransport::new(&config);
        Resolver::with_backend(config, backend)
    }

    pub fn with_backend(config: ResolverConfig, backend: impl Transport + 'static) -> Self {
        Resolver {
            config,
            backend: Some(Box::new(backend)),
        }
    }

    /// A resolver without any way to make requests. Every request fails with
    /// [`Error::NoBackendConfigured`] until one is set.
    pub fn unconfigured(config: ResolverConfig) -> Self {
        Resolver {
            config,
            backend: None,
        }
    }

    pub fn set_backend(&mut self, backend: impl Transport + 'static) {
        self.backend = Some(Box::new(backend));
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn send(
        &self,
        doi: &Doi,
        accept: Option<String>,
        follow_redirects: bool,
    ) -> Result<HttpResponse> {
        let backend = self.backend.as_deref().ok_or(Error::NoBackendConfigured)?;
        let request = HttpRequest {
            url: doi.resolver_url(&self.config.domain)?,
            accept,
            follow_redirects,
            user_agent: self.config.user_agent.clone(),
        };
        debug!(
            "GET {} (Accept: {})",
            request.url,
            request.accept.as_deref().unwrap_or("*/*")
        );
        let response = backend.get(&request)?;
        debug!(
            "{} answered {} ({})",
            request.url,
            response.status,
            response.content_type.as_deref().unwrap_or("no content type")
        );
        Ok(response)
    }

    /// Ask the resolver for `doi` in one of the `accept`ed content types, most preferred first.
    pub fn retrieve(&self, doi: &Doi, accept: &[&str]) -> Result<Retrieval> {
        let accept = (!accept.is_empty()).then(|| accept.join(", "));
        let response = self.send(doi, accept, true)?;
        if response.status != 200 {
            return Ok(Retrieval::NotFound {
                status: response.status,
            });
        }
        match response.content_type {
            Some(ct) if is_metadata_type(&ct) => Ok(Retrieval::Found {
                body: response.body,
                content_type: ct,
            }),
            other => {
                warn!("{doi}: resolver ignored content negotiation, got {other:?}");
                Err(Error::ContentTypeMismatch(other))
            }
        }
    }

    /// Where the resolver sends `doi`, without following the redirect.
    pub fn resolve_target(&self, doi: &Doi) -> Result<Option<String>> {
        let response = self.send(doi, None, false)?;
        if REDIRECT_CODES.contains(&response.status) {
            trace!("{doi} redirects to {:?}", response.location);
            Ok(response.location)
        } else {
            Ok(None)
        }
    }

    /// Retrieve and parse `doi`, picking the parser from the returned content type.
    pub fn fetch_record(&self, doi: &Doi, accept: &[&str]) -> Result<Option<MetadataRecord>> {
        match self.retrieve(doi, accept)? {
            Retrieval::Found { body, content_type } => {
                MetadataRecord::parse(&content_type, &body).map(Some)
            }
            Retrieval::NotFound { status } => {
                debug!("{doi}: no metadata (status {status})");
                Ok(None)
            }
        }
    }

    /// CSL-JSON metadata for `doi`.
    pub fn lookup_json(&self, doi: &Doi) -> Result<Option<MetadataRecord>> {
        self.lookup_as(doi, Format::CslJson)
    }

    /// UnixRef XML metadata for `doi`.
    pub fn lookup_xml(&self, doi: &Doi) -> Result<Option<MetadataRecord>> {
        self.lookup_as(doi, Format::UnixrefXml)
    }

    fn lookup_as(&self, doi: &Doi, format: Format) -> Result<Option<MetadataRecord>> {
        let (body, content_type) = match self.retrieve(doi, &[format.mime_type()])? {
            Retrieval::Found { body, content_type } => (body, content_type),
            Retrieval::NotFound { .. } => return Ok(None),
        };
        if translator::format_for(&content_type).ok() != Some(format) {
            warn!("{doi}: asked for {format}, got {content_type}");
            return Err(Error::ContentTypeMismatch(Some(content_type)));
        }
        let record = match format {
            Format::CslJson => MetadataRecord::from_csl_json(&body)?,
            Format::UnixrefXml => MetadataRecord::from_unixref_xml(&body)?,
        };
        Ok(Some(record))
    }
}

fn is_metadata_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("json") || ct.contains("xml")
}

/// `Accept` preference order with `first` leading.
pub fn preference(first: Format) -> [&'static str; 2] {
    match first {
        Format::CslJson => [CSL_JSON, UNIXREF_XML],
        Format::UnixrefXml => [UNIXREF_XML, CSL_JSON],
    }
}
