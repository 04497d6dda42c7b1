use std::{fs, path::PathBuf, str::FromStr};

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use doiref::{Format, identifier::DEFAULT_RESOLVER_DOMAIN};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// More output per occurrence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Host that DOIs are resolved against
    #[arg(long, value_name = "DOMAIN", default_value = DEFAULT_RESOLVER_DOMAIN, global = true)]
    pub resolver: String,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 10, global = true)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every DOI found in the given text or files
    Extract {
        #[arg(value_name = "SRC", required = true)]
        from: Vec<Source>,
    },
    /// Parse a saved metadata document and print it as JSON
    Parse {
        /// Declared type of the document, e.g. application/vnd.citationstyles.csl+json
        #[arg(long, value_name = "CT")]
        content_type: String,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Fetch the metadata of one or more DOIs
    Fetch {
        #[arg(value_name = "SRC", required = true)]
        from: Vec<Source>,
        /// Format to ask the resolver for first
        #[arg(long, value_enum, default_value_t = Prefer::Json)]
        prefer: Prefer,
    },
    /// Print the URL a DOI redirects to
    Target {
        #[arg(value_name = "DOI")]
        doi: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Prefer {
    Json,
    Xml,
}

impl From<Prefer> for Format {
    fn from(prefer: Prefer) -> Self {
        match prefer {
            Prefer::Json => Format::CslJson,
            Prefer::Xml => Format::UnixrefXml,
        }
    }
}

#[derive(Clone, Debug)]
/// Defines where we can get DOIs from, which can either be
///
/// - a piece of text (a bare DOI, a URL, a sentence), or
/// - a file whose whole contents are scanned.
pub enum Source {
    Identifier(String),
    File(PathBuf),
}

impl FromStr for Source {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Is this a path?
        if let Ok(path) = fs::canonicalize(s) {
            Ok(Source::File(path))
        }
        // No? Must be an identifier then!
        else {
            Ok(Source::Identifier(s.to_string()))
        }
    }
}

impl Source {
    pub fn text(&self) -> anyhow::Result<String> {
        match self {
            Source::Identifier(id) => Ok(id.clone()),
            Source::File(path) => fs::read_to_string(path)
                .with_context(|| format!("could not read {}", path.display())),
        }
    }
}
