//! Search analytics report tools.

use serde_json::{Map, Value, json};

use searchlens_core::content::ToolResult;
use searchlens_core::reports::{DateRange, format_ctr, percent_change};

use super::{opt_str_arg, str_arg, u64_arg};
use crate::ToolError;
use crate::context::ExecutionContext;
use crate::gsc::UpstreamError;
use crate::registry::ToolDescriptor;
use crate::schema::{InputSchema, PropertySpec};

const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

fn site_url_spec() -> PropertySpec {
    PropertySpec::string().describe("Full property URL, e.g. https://example.com/")
}

fn days_spec(default: u64) -> PropertySpec {
    PropertySpec::number()
        .describe("Report window in days, counted back from today")
        .default_value(json!(default))
        .range(1.0, 365.0)
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "searchlens_analytics_query",
            "Run a search analytics query with custom dimensions, date range and row limit.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property(
                    "start_date",
                    PropertySpec::string()
                        .describe("Start date (YYYY-MM-DD); defaults to the 'days' window")
                        .optional()
                        .matching(DATE_PATTERN),
                )
                .property(
                    "end_date",
                    PropertySpec::string()
                        .describe("End date (YYYY-MM-DD); defaults to today")
                        .optional()
                        .matching(DATE_PATTERN),
                )
                .property("days", days_spec(28))
                .property(
                    "dimensions",
                    PropertySpec::array()
                        .describe("Dimensions: query, page, country, device, date, searchAppearance")
                        .default_value(json!(["query"])),
                )
                .property(
                    "search_type",
                    PropertySpec::string()
                        .one_of(&["web", "image", "video", "news", "discover"])
                        .default_value(json!("web")),
                )
                .property(
                    "row_limit",
                    PropertySpec::number().default_value(json!(20)).range(1.0, 1000.0),
                ),
            |ctx, args| Box::pin(query(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_performance_overview",
            "Summarize clicks, impressions, CTR and position with a recent daily breakdown.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property("days", days_spec(28)),
            |ctx, args| Box::pin(performance_overview(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_top_queries",
            "Top search queries by clicks for a property.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property("days", days_spec(28))
                .property(
                    "limit",
                    PropertySpec::number().default_value(json!(10)).range(1.0, 100.0),
                ),
            |ctx, args| Box::pin(top_queries(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_top_pages",
            "Top pages by clicks for a property.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property("days", days_spec(28))
                .property(
                    "limit",
                    PropertySpec::number().default_value(json!(10)).range(1.0, 100.0),
                ),
            |ctx, args| Box::pin(top_pages(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_periods_compare",
            "Compare the current period against the immediately preceding one.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property("days", days_spec(28)),
            |ctx, args| Box::pin(periods_compare(ctx, args)),
        ),
    ]
}

fn requested_range(args: &Map<String, Value>) -> DateRange {
    let days = u64_arg(args, "days", 28) as u32;
    let mut range = DateRange::last_days(days);
    if let (Some(start), Some(end)) = (
        opt_str_arg(args, "start_date").and_then(|s| s.parse().ok()),
        opt_str_arg(args, "end_date").and_then(|s| s.parse().ok()),
    ) {
        range = DateRange { start, end };
    }
    range
}

async fn run_query(
    ctx: &ExecutionContext,
    token: &str,
    site_url: &str,
    range: DateRange,
    dimensions: Value,
    row_limit: u64,
    search_type: Option<&str>,
) -> Result<Vec<Value>, UpstreamError> {
    let mut body = json!({
        "startDate": range.start_str(),
        "endDate": range.end_str(),
        "dimensions": dimensions,
        "rowLimit": row_limit,
    });
    if let Some(search_type) = search_type {
        body["type"] = json!(search_type);
    }
    let response = ctx.gsc.query_analytics(token, site_url, &body).await?;
    Ok(response
        .get("rows")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

fn row_metrics(row: &Value) -> (f64, f64, f64, f64) {
    (
        row.get("clicks").and_then(Value::as_f64).unwrap_or(0.0),
        row.get("impressions").and_then(Value::as_f64).unwrap_or(0.0),
        row.get("ctr").and_then(Value::as_f64).unwrap_or(0.0),
        row.get("position").and_then(Value::as_f64).unwrap_or(0.0),
    )
}

fn row_key(row: &Value) -> String {
    row.get("keys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .map(|k| k.as_str().unwrap_or("?"))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .unwrap_or_else(|| "(total)".to_string())
}

fn format_rows(rows: &[Value]) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let (clicks, impressions, ctr, position) = row_metrics(row);
        out.push_str(&format!(
            "{}. {} - {:.0} clicks, {:.0} impressions, CTR {}, position {:.1}\n",
            i + 1,
            row_key(row),
            clicks,
            impressions,
            format_ctr(ctr),
            position,
        ));
    }
    out
}

async fn query(ctx: &ExecutionContext, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let range = requested_range(&args);
    let dimensions = args.get("dimensions").cloned().unwrap_or(json!(["query"]));
    let row_limit = u64_arg(&args, "row_limit", 20);
    let search_type = opt_str_arg(&args, "search_type");

    let token = ctx.access_token().await?;
    let rows = match run_query(ctx, &token, site_url, range, dimensions, row_limit, search_type).await
    {
        Ok(rows) => rows,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };

    if rows.is_empty() {
        return Ok(ToolResult::text(format!(
            "No search analytics data for {site_url} between {} and {}.",
            range.start_str(),
            range.end_str(),
        )));
    }

    let report = format!(
        "Search analytics for {site_url} ({} to {}):\n\n{}",
        range.start_str(),
        range.end_str(),
        format_rows(&rows),
    );
    Ok(ToolResult::text(report))
}

async fn performance_overview(
    ctx: &ExecutionContext,
    args: Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let range = requested_range(&args);
    let token = ctx.access_token().await?;

    let totals = match run_query(ctx, &token, site_url, range, json!([]), 1, None).await {
        Ok(rows) => rows,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };
    let daily = match run_query(ctx, &token, site_url, range, json!(["date"]), 366, None).await {
        Ok(rows) => rows,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };

    let mut report = format!(
        "Performance overview for {site_url} ({} to {}):\n\n",
        range.start_str(),
        range.end_str(),
    );
    match totals.first() {
        Some(row) => {
            let (clicks, impressions, ctr, position) = row_metrics(row);
            report.push_str(&format!(
                "Totals: {clicks:.0} clicks, {impressions:.0} impressions, CTR {}, avg position {position:.1}\n",
                format_ctr(ctr),
            ));
        }
        None => report.push_str("Totals: no data recorded in this window.\n"),
    }

    if !daily.is_empty() {
        report.push_str("\nLast 7 days with data:\n");
        for row in daily.iter().rev().take(7).rev() {
            let (clicks, impressions, _, _) = row_metrics(row);
            report.push_str(&format!(
                "  {}: {clicks:.0} clicks, {impressions:.0} impressions\n",
                row_key(row),
            ));
        }
    }
    Ok(ToolResult::text(report))
}

async fn top_by_dimension(
    ctx: &ExecutionContext,
    args: Map<String, Value>,
    dimension: &str,
    label: &str,
) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let range = requested_range(&args);
    let limit = u64_arg(&args, "limit", 10);
    let token = ctx.access_token().await?;

    let rows = match run_query(ctx, &token, site_url, range, json!([dimension]), limit, None).await {
        Ok(rows) => rows,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };

    if rows.is_empty() {
        return Ok(ToolResult::text(format!(
            "No {label} data for {site_url} between {} and {}.",
            range.start_str(),
            range.end_str(),
        )));
    }

    Ok(ToolResult::text(format!(
        "Top {label} for {site_url} ({} to {}):\n\n{}",
        range.start_str(),
        range.end_str(),
        format_rows(&rows),
    )))
}

async fn top_queries(
    ctx: &ExecutionContext,
    args: Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    top_by_dimension(ctx, args, "query", "queries").await
}

async fn top_pages(
    ctx: &ExecutionContext,
    args: Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    top_by_dimension(ctx, args, "page", "pages").await
}

async fn periods_compare(
    ctx: &ExecutionContext,
    args: Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let current = requested_range(&args);
    let previous = current.previous();
    let token = ctx.access_token().await?;

    let current_rows = match run_query(ctx, &token, site_url, current, json!([]), 1, None).await {
        Ok(rows) => rows,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };
    let previous_rows = match run_query(ctx, &token, site_url, previous, json!([]), 1, None).await {
        Ok(rows) => rows,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };

    let zero = json!({});
    let (cur_clicks, cur_impressions, cur_ctr, cur_position) =
        row_metrics(current_rows.first().unwrap_or(&zero));
    let (prev_clicks, prev_impressions, prev_ctr, prev_position) =
        row_metrics(previous_rows.first().unwrap_or(&zero));

    let report = format!(
        "Period comparison for {site_url}:\n\
         Current  {} to {}\n\
         Previous {} to {}\n\n\
         Clicks:      {cur_clicks:.0} vs {prev_clicks:.0} ({})\n\
         Impressions: {cur_impressions:.0} vs {prev_impressions:.0} ({})\n\
         CTR:         {} vs {} ({})\n\
         Position:    {cur_position:.1} vs {prev_position:.1} ({})\n",
        current.start_str(),
        current.end_str(),
        previous.start_str(),
        previous.end_str(),
        percent_change(cur_clicks, prev_clicks),
        percent_change(cur_impressions, prev_impressions),
        format_ctr(cur_ctr),
        format_ctr(prev_ctr),
        percent_change(cur_ctr, prev_ctr),
        percent_change(cur_position, prev_position),
    );
    Ok(ToolResult::text(report))
}
