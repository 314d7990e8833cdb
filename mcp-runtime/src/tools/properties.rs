//! Property discovery and management tools.

use serde_json::{Map, Value};

use searchlens_core::content::ToolResult;

use super::{str_arg, upstream_tool_error};
use crate::ToolError;
use crate::context::ExecutionContext;
use crate::registry::ToolDescriptor;
use crate::schema::{InputSchema, PropertySpec};

fn site_url_spec() -> PropertySpec {
    PropertySpec::string().describe("Full property URL, e.g. https://example.com/ or sc-domain:example.com")
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "searchlens_properties_list",
            "List all Search Console properties the authorized account can access.",
            InputSchema::new(),
            |ctx, args| Box::pin(list(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_property_get",
            "Show details (permission level, verification) for one property.",
            InputSchema::new().property("site_url", site_url_spec()),
            |ctx, args| Box::pin(get(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_property_add",
            "Add a property to the authorized Search Console account.",
            InputSchema::new().property("site_url", site_url_spec()),
            |ctx, args| Box::pin(add(ctx, args)),
        ),
        ToolDescriptor::new(
            "searchlens_property_delete",
            "Remove a property from the authorized Search Console account.",
            InputSchema::new().property("site_url", site_url_spec()),
            |ctx, args| Box::pin(delete(ctx, args)),
        ),
    ]
}

async fn list(ctx: &ExecutionContext, _args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let token = ctx.access_token().await?;
    let body = match ctx.gsc.list_sites(&token).await {
        Ok(body) => body,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };

    let sites = body
        .get("siteEntry")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if sites.is_empty() {
        return Ok(ToolResult::text(
            "No Search Console properties found.\n\n\
             The authorized account has no access to any properties. Add it \
             as a user on your properties in Search Console, or verify a new \
             property with searchlens_property_add.",
        ));
    }

    let mut report = format!("Found {} Search Console properties:\n\n", sites.len());
    for (i, site) in sites.iter().enumerate() {
        let site_url = site.get("siteUrl").and_then(Value::as_str).unwrap_or("unknown");
        let permission = site
            .get("permissionLevel")
            .and_then(Value::as_str)
            .unwrap_or("unknown permission");
        report.push_str(&format!("{}. {} ({})\n", i + 1, site_url, permission));
    }
    Ok(ToolResult::text(report))
}

async fn get(ctx: &ExecutionContext, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let token = ctx.access_token().await?;
    let site = match ctx.gsc.get_site(&token, site_url).await {
        Ok(site) => site,
        Err(err) => return Ok(ToolResult::error_text(err)),
    };

    let permission = site
        .get("permissionLevel")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let report = format!(
        "Property: {}\nPermission level: {}\n",
        site.get("siteUrl").and_then(Value::as_str).unwrap_or(site_url),
        permission,
    );
    Ok(ToolResult::text(report))
}

async fn add(ctx: &ExecutionContext, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let token = ctx.access_token().await?;
    ctx.gsc
        .add_site(&token, site_url)
        .await
        .map_err(upstream_tool_error)?;
    Ok(ToolResult::text(format!(
        "Added property {site_url}.\n\
         Ownership still needs to be verified in Search Console before data \
         becomes available."
    )))
}

async fn delete(ctx: &ExecutionContext, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
    let site_url = str_arg(&args, "site_url");
    let token = ctx.access_token().await?;
    ctx.gsc
        .delete_site(&token, site_url)
        .await
        .map_err(upstream_tool_error)?;
    Ok(ToolResult::text(format!(
        "Removed property {site_url} from the authorized account. The site \
         itself and its data in Search Console are unaffected."
    )))
}
