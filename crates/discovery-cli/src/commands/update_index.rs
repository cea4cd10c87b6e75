//! Index rebuild command

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde_json::Value;

use crate::output::{format_output, OutputFormat};
use crate::{AppContext, Cli};
use discovery_core::IndexDocument;
use discovery_search::{IndexRebuilder, StaticSource};

#[derive(Args)]
pub struct UpdateIndexArgs {
    /// Documents to index, one JSON source body per line
    #[arg(short, long)]
    pub documents: PathBuf,

    /// Swap the alias even when the record count changed beyond the threshold
    #[arg(long)]
    pub sanity_check_disabled: bool,
}

/// Read newline-delimited documents; blank lines are skipped
pub fn read_documents(path: &Path) -> anyhow::Result<Vec<IndexDocument>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents from {}", path.display()))?;

    let mut documents = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let source: Value = serde_json::from_str(line)
            .with_context(|| format!("{} line {}: invalid JSON", path.display(), n + 1))?;
        let document = IndexDocument::from_source(source)
            .with_context(|| format!("{} line {}", path.display(), n + 1))?;
        documents.push(document);
    }
    Ok(documents)
}

pub async fn run(args: &UpdateIndexArgs, cli: &Cli) -> anyhow::Result<()> {
    let documents = read_documents(&args.documents)?;
    tracing::info!(
        "Read {} documents from {}",
        documents.len(),
        args.documents.display()
    );

    let ctx = AppContext::new(cli)?;
    let rebuilder = IndexRebuilder::new(ctx.connection.clone(), ctx.settings.clone())
        .with_sanity_check_disabled(args.sanity_check_disabled);
    let report = rebuilder.rebuild(&StaticSource::new(documents)).await?;

    let format = OutputFormat::from(cli.format.as_str());
    if !(cli.quiet && format == OutputFormat::Table) {
        println!("{}", format_output(&report, format));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_documents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"django_ct": "course_metadata.courserun", "django_id": 1, "title": "Intro"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"django_ct": "course_metadata.courserun", "django_id": "2", "title": "Physics"}}"#
        )
        .unwrap();

        let documents = read_documents(file.path()).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].id(), "course_metadata.courserun.1");
        assert_eq!(documents[1].fields["title"], "Physics");
    }

    #[test]
    fn test_read_documents_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"django_ct": "course_metadata.courserun", "django_id": 1}}"#).unwrap();
        writeln!(file, r#"{{"title": "no content type"}}"#).unwrap();

        let err = read_documents(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
