pub mod doi;

pub use doi::{DEFAULT_RESOLVER_DOMAIN, Doi, extract_all, is_valid, normalize, normalize_with};
