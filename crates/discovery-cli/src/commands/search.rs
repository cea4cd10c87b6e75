//! Search command

use clap::Args;

use crate::output::{format_output, OutputFormat};
use crate::{AppContext, Cli};
use discovery_core::{FacetSpec, SearchRequest, SearchResult, SortSpec};

#[derive(Args)]
pub struct SearchArgs {
    /// Query string; `*:*` matches everything
    pub query: String,

    /// Field facet, optionally with a bucket count (can be used multiple times)
    #[arg(long = "facet", value_name = "FIELD[:SIZE]")]
    pub facets: Vec<String>,

    /// Named query facet (can be used multiple times)
    #[arg(long = "query-facet", value_name = "NAME=QUERY")]
    pub query_facets: Vec<String>,

    /// Count hits and facets by distinct values of this field
    #[arg(long, value_name = "FIELD")]
    pub distinct_by: Option<String>,

    /// Sort field, `-` prefix for descending (can be used multiple times)
    #[arg(long, value_name = "[-]FIELD", allow_hyphen_values = true)]
    pub sort: Vec<String>,

    /// Filter query string (can be used multiple times)
    #[arg(long, value_name = "QUERY")]
    pub narrow: Vec<String>,

    /// Restrict to a model, as app_label.model_name (can be used multiple times)
    #[arg(long, value_name = "CONTENT_TYPE")]
    pub model: Vec<String>,

    /// Offset of the first hit
    #[arg(long, default_value = "0")]
    pub start: usize,

    /// Offset after the last hit
    #[arg(long)]
    pub end: Option<usize>,

    /// Highlight matches in the content field
    #[arg(long)]
    pub highlight: bool,
}

/// Parse `field` or `field:size`
fn parse_facet(spec: &str) -> anyhow::Result<(String, FacetSpec)> {
    match spec.rsplit_once(':') {
        Some((field, size)) => {
            let size: u32 = size
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid facet size in '{}'", spec))?;
            Ok((field.to_string(), FacetSpec::terms_with_size(field, size)))
        }
        None => Ok((spec.to_string(), FacetSpec::terms(spec))),
    }
}

/// Parse `name=query`
fn parse_query_facet(spec: &str) -> anyhow::Result<(String, String)> {
    spec.split_once('=')
        .filter(|(name, query)| !name.is_empty() && !query.is_empty())
        .map(|(name, query)| (name.to_string(), query.to_string()))
        .ok_or_else(|| anyhow::anyhow!("Query facet must be NAME=QUERY, got '{}'", spec))
}

pub fn build_request(args: &SearchArgs) -> anyhow::Result<SearchRequest> {
    let mut request = SearchRequest::new(&args.query);

    for spec in &args.facets {
        let (name, facet) = parse_facet(spec)?;
        request = request.with_facet(name, facet);
    }
    for spec in &args.query_facets {
        let (name, query) = parse_query_facet(spec)?;
        request = request.with_query_facet(name, query);
    }
    for spec in &args.sort {
        request = request.with_sort(SortSpec::parse(spec));
    }
    for query in &args.narrow {
        request = request.with_narrow_query(query);
    }
    for model in &args.model {
        request = request.with_model(model);
    }
    if let Some(field) = &args.distinct_by {
        request = request.with_distinct_counts_by(field);
    }
    if args.highlight {
        request = request.with_highlight();
    }

    request.start_offset = args.start;
    request.end_offset = args.end;

    Ok(request)
}

pub async fn run(args: &SearchArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let request = build_request(args)?;
    let result: SearchResult = ctx.backend().search(&request).await?;

    tracing::info!(
        "Search for '{}' returned {} of {} hits",
        request.query,
        result.results.len(),
        result.hits
    );

    let format = OutputFormat::from(cli.format.as_str());
    if !(cli.quiet && format == OutputFormat::Table) {
        println!("{}", format_output(&result, format));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_facet() {
        let (name, facet) = parse_facet("subjects:5").unwrap();
        assert_eq!(name, "subjects");
        assert_eq!(facet, FacetSpec::terms_with_size("subjects", 5));

        let (_, facet) = parse_facet("org").unwrap();
        assert_eq!(facet, FacetSpec::terms("org"));

        assert!(parse_facet("org:many").is_err());
    }

    #[test]
    fn test_parse_query_facet() {
        assert_eq!(
            parse_query_facet("upcoming=start:[now TO *]").unwrap(),
            ("upcoming".to_string(), "start:[now TO *]".to_string())
        );
        assert!(parse_query_facet("upcoming").is_err());
        assert!(parse_query_facet("=x").is_err());
    }
}
