//! Resolve DOIs to bibliographic metadata.
//!
//! DOIs are pulled out of free text or URLs by [`identifier`], fetched from a resolver with
//! content negotiation by [`resolver`], and parsed by one of the [`translator`]s into a
//! [`MetadataRecord`].

pub mod error;
pub mod identifier;
pub mod item;
pub mod resolver;
pub mod translator;
mod xml;

pub use error::{Error, Result};
pub use identifier::Doi;
pub use item::{Classification, Contributor, DocumentKind, Field, MetadataRecord, PartialDate, Role};
pub use resolver::{Resolver, ResolverConfig, Retrieval, Transport};
pub use translator::{Format, Translator};
