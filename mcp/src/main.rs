use std::sync::Arc;

use clap::{Parser, Subcommand};

use searchlens_mcp_runtime::context::{ExecutionContext, RuntimeConfig};
use searchlens_mcp_runtime::{McpServer, default_token_manager, serve_stdio, tools};

#[derive(Parser)]
#[command(
    name = "searchlens-mcp",
    version,
    about = "searchlens MCP server: Search Console tools over stdio"
)]
struct Cli {
    /// Identity key for the token store
    #[arg(long, env = "SEARCHLENS_USER_KEY", default_value = "default")]
    user_key: String,

    /// Bearer token override (skips the token store)
    #[arg(long, env = "SEARCHLENS_ACCESS_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio with Content-Length framing
    Serve,
    /// Print the tool list as JSON and exit
    Tools,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let registry =
        Arc::new(tools::build_registry().expect("Failed to build tool registry"));

    let mut runtime = RuntimeConfig::from_env();
    runtime.user_key = cli.user_key;
    if cli.token.is_some() {
        runtime.explicit_token = cli.token;
    }

    let context = ExecutionContext::new(runtime, default_token_manager());
    let server = McpServer::new(registry.clone(), context);

    let code = match cli.command {
        Commands::Serve => match serve_stdio(&server).await {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("{err}");
                1
            }
        },
        Commands::Tools => {
            let tools: Vec<serde_json::Value> = registry
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "name": tool.name,
                        "description": tool.description,
                        "inputSchema": tool.schema.describe(),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "tools": tools }))
                    .unwrap_or_else(|_| "{}".to_string())
            );
            0
        }
    };
    std::process::exit(code);
}
