use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const CSL: &str = r#"{
    "type": "article-journal",
    "container-title": "Rehabilitation Psychology",
    "ISSN": ["1939-1544"],
    "DOI": "10.1037/0090-5550.52.1.74",
    "publisher": "American Psychological Association (APA)",
    "issued": {"date-parts": [[2007]]}
}"#;

const UNIXREF: &str = r#"<doi_records><doi_record><crossref><book>
  <book_metadata>
    <titles><title>Organizational Dynamics of Technology-Based Innovation</title></titles>
    <isbn media_type="print">978-0-387-72803-2</isbn>
    <isbn media_type="electronic">978-0-387-72803-X</isbn>
    <doi_data><doi>10.1007/978-0-387-72804-9</doi></doi_data>
  </book_metadata>
</book></crossref></doi_record></doi_records>"#;

fn file_with(contents: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("tmp file");
    tmp.write_all(contents.as_bytes()).expect("write tmp file");
    tmp
}

#[test]
fn extract_from_literal_text() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("doiref")?
        .args([
            "extract",
            "https://dx.doi.org/10.1037/0090-5550.52.1.74/abstract",
        ])
        .assert()
        .success()
        .stdout("10.1037/0090-5550.52.1.74\n");
    Ok(())
}

#[test]
fn extract_from_file_keeps_duplicates() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = file_with(
        "First doi:10.1000/182 then http://dx.doi.org/10.1000/182 and finally nothing.\n",
    );
    Command::cargo_bin("doiref")?
        .arg("extract")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout("10.1000/182\n10.1000/182\n");
    Ok(())
}

#[test]
fn extract_prints_nothing_for_plain_text() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("doiref")?
        .args(["extract", "no identifiers in here"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    Ok(())
}

#[test]
fn parse_csl_json_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = file_with(CSL);
    let output = Command::cargo_bin("doiref")?
        .args(["parse", "--content-type", "application/vnd.citationstyles.csl+json"])
        .arg(tmp.path())
        .output()?;
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(record["journal_title"], "Rehabilitation Psychology");
    assert_eq!(record["issn"], "1939-1544");
    assert!(record["book_title"].is_null());
    assert_eq!(record["publication_date"], "2007-01-01");
    assert!(record["publication_date_parts"]["month"].is_null());
    Ok(())
}

#[test]
fn parse_unixref_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = file_with(UNIXREF);
    let output = Command::cargo_bin("doiref")?
        .args(["parse", "--content-type", "application/vnd.crossref.unixref+xml"])
        .arg(tmp.path())
        .output()?;
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(record["isbn"], "978-0-387-72803-2");
    assert_eq!(record["eisbn"], "978-0-387-72803-X");
    assert_eq!(record["doi"], "10.1007/978-0-387-72804-9");
    Ok(())
}

#[test]
fn parse_rejects_unknown_content_type() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = file_with(CSL);
    Command::cargo_bin("doiref")?
        .args(["parse", "--content-type", "text/html"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported content type"));
    Ok(())
}

#[test]
fn parse_reports_malformed_documents() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = file_with("this is not xml");
    Command::cargo_bin("doiref")?
        .args(["parse", "--content-type", "application/vnd.crossref.unixref+xml"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed UnixRef XML document"));
    Ok(())
}

#[test]
fn fetch_invalid_identifier_never_hits_the_network() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::cargo_bin("doiref")?
        .env("NO_COLOR", "1")
        .args(["fetch", "this-is-not-a-doi", "--resolver", "resolver.invalid"])
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let stderr = String::from_utf8(strip_ansi_escapes::strip(output.stderr))?;
    assert!(stdout.is_empty(), "stdout should be empty, got=\n{}", stdout);
    assert!(
        stderr.contains("not a valid DOI: \"this-is-not-a-doi\"")
            && stderr.contains("✓ 0")
            && stderr.contains("✗ 1"),
        "stderr mismatch. stderr=\n{}",
        stderr
    );
    Ok(())
}

#[test]
fn target_rejects_invalid_doi() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("doiref")?
        .args(["target", "not-a-doi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid DOI"));
    Ok(())
}

#[test]
fn target_accepts_urls_on_the_configured_resolver() -> Result<(), Box<dyn std::error::Error>> {
    // `.invalid` never resolves, so the lookup itself fails after the DOI is accepted.
    Command::cargo_bin("doiref")?
        .args([
            "target",
            "https://resolver.invalid/10.1234/abcd",
            "--resolver",
            "resolver.invalid",
            "--timeout",
            "2",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid DOI").not());
    Ok(())
}

#[test]
fn help_lists_commands() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("doiref")?
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("extract")
                .and(predicate::str::contains("parse"))
                .and(predicate::str::contains("fetch"))
                .and(predicate::str::contains("target")),
        );
    Ok(())
}
