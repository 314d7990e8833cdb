//! URL inspection and indexing coverage tools.

use serde_json::{Map, Value, json};

use searchlens_core::content::ToolResult;
use searchlens_core::error::codes;
use searchlens_core::reports::DateRange;

use super::{str_arg, u64_arg};
use crate::ToolError;
use crate::context::ExecutionContext;
use crate::registry::ToolDescriptor;
use crate::schema::{InputSchema, PropertySpec};

const BATCH_LIMIT: usize = 10;

fn site_url_spec() -> PropertySpec {
    PropertySpec::string().describe("Full property URL the pages belong to")
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "searchlens_indexing_check",
            "Inspect the property's top pages and report indexing problems.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property(
                    "max_pages",
                    PropertySpec::number()
                        .describe("How many top pages to sample")
                        .default_value(json!(10))
                        .range(1.0, 25.0),
                ),
            |ctx, args| Box::pin(indexing_check(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_url_inspect",
            "Inspect one URL's index status, canonical choice and crawl state.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property(
                    "page_url",
                    PropertySpec::string().describe("Absolute URL of the page to inspect"),
                ),
            |ctx, args| Box::pin(url_inspect(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_url_inspect_batch",
            "Inspect up to 10 URLs and report their index status together.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property(
                    "page_urls",
                    PropertySpec::array().describe("Absolute URLs to inspect (max 10)"),
                ),
            |ctx, args| Box::pin(url_inspect_batch(ctx, args)),
        ),
    ]
}

fn index_status(result: &Value) -> Value {
    result
        .pointer("/inspectionResult/indexStatusResult")
        .cloned()
        .unwrap_or(Value::Null)
}

fn status_line(status: &Value, key: &str, label: &str) -> Option<String> {
    status
        .get(key)
        .and_then(Value::as_str)
        .map(|v| format!("{label}: {v}\n"))
}

async fn url_inspect(
    ctx: &ExecutionContext,
    args: Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let page_url = str_arg(&args, "page_url");
    let token = ctx.access_token().await?;

    let result = match ctx.gsc.inspect_url(&token, site_url, page_url).await {
        Ok(result) => result,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };

    let status = index_status(&result);
    let mut report = format!("URL inspection for {page_url}:\n\n");
    for (key, label) in [
        ("verdict", "Verdict"),
        ("coverageState", "Coverage"),
        ("indexingState", "Indexing state"),
        ("robotsTxtState", "robots.txt"),
        ("pageFetchState", "Page fetch"),
        ("lastCrawlTime", "Last crawl"),
        ("googleCanonical", "Google canonical"),
        ("userCanonical", "User canonical"),
    ] {
        if let Some(line) = status_line(&status, key, label) {
            report.push_str(&line);
        }
    }
    if status.is_null() {
        report.push_str("No index status returned for this URL.\n");
    }
    Ok(ToolResult::text(report))
}

async fn url_inspect_batch(
    ctx: &ExecutionContext,
    args: Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let page_urls: Vec<String> = args
        .get("page_urls")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    if page_urls.is_empty() {
        return Err(ToolError::new(
            codes::VALIDATION_FAILED,
            "'page_urls' must contain at least one URL",
        )
        .with_field("page_urls"));
    }
    if page_urls.len() > BATCH_LIMIT {
        return Err(ToolError::new(
            codes::VALIDATION_FAILED,
            format!("'page_urls' accepts at most {BATCH_LIMIT} URLs per call"),
        )
        .with_field("page_urls"));
    }

    let token = ctx.access_token().await?;
    let mut report = format!("Batch inspection for {} URLs:\n\n", page_urls.len());
    for page_url in &page_urls {
        match ctx.gsc.inspect_url(&token, site_url, page_url).await {
            Ok(result) => {
                let status = index_status(&result);
                let verdict = status.get("verdict").and_then(Value::as_str).unwrap_or("UNKNOWN");
                let coverage = status
                    .get("coverageState")
                    .and_then(Value::as_str)
                    .unwrap_or("no coverage state");
                report.push_str(&format!("{page_url}\n  {verdict} - {coverage}\n"));
            }
            Err(err) => {
                report.push_str(&format!("{page_url}\n  Error: {err}\n"));
            }
        }
    }
    Ok(ToolResult::text(report))
}

async fn indexing_check(
    ctx: &ExecutionContext,
    args: Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let max_pages = u64_arg(&args, "max_pages", 10);
    let token = ctx.access_token().await?;

    let range = DateRange::last_days(28);
    let body = json!({
        "startDate": range.start_str(),
        "endDate": range.end_str(),
        "dimensions": ["page"],
        "rowLimit": max_pages,
    });
    let response = match ctx.gsc.query_analytics(&token, site_url, &body).await {
        Ok(response) => response,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };
    let pages: Vec<String> = response
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.pointer("/keys/0").and_then(Value::as_str))
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    if pages.is_empty() {
        return Ok(ToolResult::text(format!(
            "No pages with search traffic found for {site_url} in the last 28 \
             days, so there is nothing to sample for indexing issues."
        )));
    }

    let mut issues = Vec::new();
    let mut checked = 0usize;
    for page in &pages {
        match ctx.gsc.inspect_url(&token, site_url, page).await {
            Ok(result) => {
                checked += 1;
                let status = index_status(&result);
                let verdict = status.get("verdict").and_then(Value::as_str).unwrap_or("UNKNOWN");
                if verdict != "PASS" {
                    let coverage = status
                        .get("coverageState")
                        .and_then(Value::as_str)
                        .unwrap_or("no coverage state");
                    issues.push(format!("{page}\n  {verdict} - {coverage}"));
                }
            }
            Err(err) => issues.push(format!("{page}\n  inspection failed: {err}")),
        }
    }

    let mut report = format!(
        "Indexing check for {site_url}: sampled {checked} of the top {} pages:\n\n",
        pages.len()
    );
    if issues.is_empty() {
        report.push_str("All sampled pages pass URL inspection.\n");
    } else {
        report.push_str(&format!("{} pages need attention:\n\n", issues.len()));
        for issue in &issues {
            report.push_str(issue);
            report.push('\n');
        }
        report.push_str(
            "\nCommon fixes: submit the affected URLs in a sitemap, resolve \
             noindex/robots.txt blocks, and check canonical tags.\n",
        );
    }
    Ok(ToolResult::text(report))
}
