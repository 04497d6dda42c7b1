use std::{fs, time::Duration};

use anyhow::{Context, bail};
use clap::Parser;
use doiref::{
    Doi, MetadataRecord, Resolver, ResolverConfig,
    identifier::extract_all,
    resolver::preference,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use owo_colors::OwoColorize;
use serde_json::Value;

use crate::cli::{Cli, Command, GlobalOpts, Prefer, Source};

mod cli;

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    setup_errlog(&args.global)?;
    match args.command {
        Command::Extract { from } => {
            for source in &from {
                for doi in extract_all(&source.text()?) {
                    println!("{doi}");
                }
            }
        }
        Command::Parse { content_type, file } => {
            let body = fs::read_to_string(&file)
                .with_context(|| format!("could not read {}", file.display()))?;
            let record = MetadataRecord::parse(&content_type, &body)
                .with_context(|| format!("could not parse {}", file.display()))?;
            print_record(&record)?;
        }
        Command::Fetch { from, prefer } => fetch(&resolver(&args.global), &from, prefer)?,
        Command::Target { doi } => {
            let doi = Doi::with_resolver(&doi, &args.global.resolver)?;
            match resolver(&args.global).resolve_target(&doi)? {
                Some(target) => println!("{target}"),
                None => bail!("{doi} does not redirect anywhere"),
            }
        }
    }
    Ok(())
}

fn setup_errlog(opts: &GlobalOpts) -> anyhow::Result<()> {
    // quiet wins over verbose; errors are always shown
    let verbosity = if opts.quiet {
        0
    } else {
        1 + usize::from(opts.verbose)
    };
    stderrlog::new().verbosity(verbosity).init()?;
    Ok(())
}

fn resolver(opts: &GlobalOpts) -> Resolver {
    Resolver::new(
        ResolverConfig::default()
            .domain(opts.resolver.as_str())
            .timeout(Duration::from_secs(opts.timeout)),
    )
}

fn print_record(record: &MetadataRecord) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&Value::Object(record.to_map()))?
    );
    Ok(())
}

/// DOIs named by `from`, in order. Sources that name none are errors.
fn collect_dois(from: &[Source], domain: &str) -> (Vec<Doi>, Vec<String>) {
    let mut dois = Vec::new();
    let mut failures = Vec::new();
    for source in from {
        let text = match source.text() {
            Ok(text) => text,
            Err(e) => {
                failures.push(format!("{e:#}"));
                continue;
            }
        };
        let found: Vec<Doi> = extract_all(&text)
            .iter()
            .filter_map(|raw| Doi::with_resolver(raw, domain).ok())
            .collect();
        if found.is_empty() {
            let label = match source {
                Source::Identifier(id) => id.clone(),
                Source::File(path) => path.display().to_string(),
            };
            failures.push(doiref::Error::InvalidIdentifier(label).to_string());
        }
        dois.extend(found);
    }
    (dois, failures)
}

fn fetch(resolver: &Resolver, from: &[Source], prefer: Prefer) -> anyhow::Result<()> {
    let accept = preference(prefer.into());
    let (dois, failures) = collect_dois(from, &resolver.config().domain);
    for failure in &failures {
        error!("{failure}");
    }

    let pb = ProgressBar::new(dois.len() as u64)
        .with_style(ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")?);
    let (mut ok, mut failed) = (0usize, failures.len());
    for doi in &dois {
        pb.set_message(doi.to_string());
        match resolver.fetch_record(doi, &accept) {
            Ok(Some(record)) => {
                pb.suspend(|| print_record(&record))?;
                ok += 1;
            }
            Ok(None) => {
                pb.suspend(|| error!("{doi}: not found"));
                failed += 1;
            }
            Err(e) => {
                pb.suspend(|| error!("{doi}: {:#}", anyhow::Error::from(e)));
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("fetched {ok} of {} DOIs", ok + failed);
    eprintln!("{} {ok} {} {failed}", "✓".green(), "✗".red());
    Ok(())
}
