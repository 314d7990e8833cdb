//! Sitemap listing and submission tools.

use serde_json::{Map, Value};

use searchlens_core::content::ToolResult;

use super::{str_arg, upstream_tool_error};
use crate::ToolError;
use crate::context::ExecutionContext;
use crate::registry::ToolDescriptor;
use crate::schema::{InputSchema, PropertySpec};

fn site_url_spec() -> PropertySpec {
    PropertySpec::string().describe("Full property URL the sitemap belongs to")
}

fn sitemap_url_spec() -> PropertySpec {
    PropertySpec::string().describe("Absolute sitemap URL, e.g. https://example.com/sitemap.xml")
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "searchlens_sitemaps_list",
            "List sitemaps submitted for a property.",
            InputSchema::new().property("site_url", site_url_spec()),
            |ctx, args| Box::pin(list(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_sitemap_get",
            "Show submission status, errors and contents for one sitemap.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property("sitemap_url", sitemap_url_spec()),
            |ctx, args| Box::pin(get(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_sitemap_submit",
            "Submit a sitemap for a property.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property("sitemap_url", sitemap_url_spec()),
            |ctx, args| Box::pin(submit(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_sitemap_delete",
            "Delete a submitted sitemap from a property.",
            InputSchema::new()
                .property("site_url", site_url_spec())
                .property("sitemap_url", sitemap_url_spec()),
            |ctx, args| Box::pin(delete(ctx, args)),
        ),
    ]
}

fn sitemap_summary(sitemap: &Value) -> String {
    let path = sitemap.get("path").and_then(Value::as_str).unwrap_or("unknown path");
    let pending = sitemap
        .get("isPending")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let errors = sitemap.get("errors").and_then(Value::as_str).unwrap_or("0");
    let warnings = sitemap.get("warnings").and_then(Value::as_str).unwrap_or("0");
    let last_submitted = sitemap
        .get("lastSubmitted")
        .and_then(Value::as_str)
        .unwrap_or("never");

    let mut summary = format!("{path}\n  submitted {last_submitted}");
    if pending {
        summary.push_str(", processing pending");
    }
    summary.push_str(&format!(", {errors} errors, {warnings} warnings\n"));
    summary
}

async fn list(ctx: &ExecutionContext, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let token = ctx.access_token().await?;

    let body = match ctx.gsc.list_sitemaps(&token, site_url).await {
        Ok(body) => body,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };
    let sitemaps = body
        .get("sitemap")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if sitemaps.is_empty() {
        return Ok(ToolResult::text(format!(
            "No sitemaps submitted for {site_url}. Submit one with \
             searchlens_sitemap_submit."
        )));
    }

    let mut report = format!("{} sitemaps for {site_url}:\n\n", sitemaps.len());
    for sitemap in &sitemaps {
        report.push_str(&sitemap_summary(sitemap));
    }
    Ok(ToolResult::text(report))
}

async fn get(ctx: &ExecutionContext, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let sitemap_url = str_arg(&args, "sitemap_url");
    let token = ctx.access_token().await?;

    let sitemap = match ctx.gsc.get_sitemap(&token, site_url, sitemap_url).await {
        Ok(sitemap) => sitemap,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };

    let mut report = format!("Sitemap details for {sitemap_url}:\n\n");
    report.push_str(&sitemap_summary(&sitemap));
    if let Some(contents) = sitemap.get("contents").and_then(Value::as_array) {
        report.push_str("\nContents:\n");
        for entry in contents {
            let kind = entry.get("type").and_then(Value::as_str).unwrap_or("unknown");
            let submitted = entry.get("submitted").and_then(Value::as_str).unwrap_or("0");
            let indexed = entry.get("indexed").and_then(Value::as_str).unwrap_or("0");
            report.push_str(&format!(
                "  {kind}: {submitted} submitted, {indexed} indexed\n"
            ));
        }
    }
    Ok(ToolResult::text(report))
}

async fn submit(ctx: &ExecutionContext, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let sitemap_url = str_arg(&args, "sitemap_url");
    let token = ctx.access_token().await?;

    ctx.gsc
        .submit_sitemap(&token, site_url, sitemap_url)
        .await
        .map_err(upstream_tool_error)?;
    Ok(ToolResult::text(format!(
        "Submitted {sitemap_url} for {site_url}. Processing can take a while; \
         check status with searchlens_sitemap_get."
    )))
}

async fn delete(ctx: &ExecutionContext, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let sitemap_url = str_arg(&args, "sitemap_url");
    let token = ctx.access_token().await?;

    ctx.gsc
        .delete_sitemap(&token, site_url, sitemap_url)
        .await
        .map_err(upstream_tool_error)?;
    Ok(ToolResult::text(format!(
        "Deleted {sitemap_url} from {site_url}. The sitemap file itself is \
         not removed from your server."
    )))
}
