//! Portion Geometry
//!
//! An MCP server for depth-based portion and calorie estimation.

use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};
use tracing_subscriber::EnvFilter;

use portion_geometry::build_info;
use portion_geometry::config::{GeometryConfig, CONFIG_PATH_ENV};
use portion_geometry::mcp::GeometryService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (output to stderr to not interfere with MCP stdio)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("portion_geometry=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    // Print startup banner to stderr
    build_info::print_startup_banner();
    eprintln!("Starting MCP server on stdio...");

    // Load configuration
    let (config, config_path) = GeometryConfig::from_env()?;
    match config_path {
        Some(ref path) => eprintln!("Configuration: {}", path.display()),
        None => eprintln!("Configuration: built-in defaults (set {} to override)", CONFIG_PATH_ENV),
    }

    // Create the service
    let service = GeometryService::new(config, config_path);

    // Create stdio transport
    let transport = (stdin(), stdout());

    // Start the MCP server
    let server = service.serve(transport).await?;

    // Wait for the server to complete
    server.waiting().await?;

    Ok(())
}
