use std::sync::Arc;

use permission_broker::cli::Console;
use permission_broker::logging;
use permission_broker::oracle::{ForegroundTracker, HostPromptBridge, PromptContext};
use permission_broker::permissions::HostPermission;
use permission_broker::runtime::ChannelSink;
use permission_broker::{BrokerConfig, MediationController};

const USAGE: &str = "usage: permission-broker <origin> <capability>[,<capability>...]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let console = Arc::new(Console::new());

    // Checked before logging starts so exiting drops no buffered log lines
    let mut args = std::env::args().skip(1);
    let (Some(origin), Some(capabilities)) = (args.next(), args.next()) else {
        console.print_error(USAGE);
        std::process::exit(2);
    };

    // Initialize logging system
    let _guard = logging::init_logging()?;
    let capabilities: Vec<String> = capabilities
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();

    tracing::info!("=== Permission Broker Starting ===");

    let config = BrokerConfig::from_env()?;
    console.print_banner();

    // The terminal plays the host OS: it presents every prompt
    let (bridge, mut prompts) = HostPromptBridge::new();
    let bridge = Arc::new(bridge);
    let contexts = Arc::new(ForegroundTracker::with_context(
        PromptContext::new("terminal").with_label("This terminal"),
    ));
    let (sink, mut resolutions) = ChannelSink::channel();

    let controller = MediationController::from_config(&config, bridge.clone(), contexts, Arc::new(sink))?;

    let host = bridge.clone();
    let prompt_console = console.clone();
    tokio::spawn(async move {
        while let Some(prompt) = prompts.recv().await {
            let token = prompt.token;
            let permissions = prompt.permissions.clone();
            let console = prompt_console.clone();

            // Blocking stdin read off the async workers
            let answer = tokio::task::spawn_blocking(move || console.ask_permissions(&prompt)).await;
            match answer {
                Ok(Ok(true)) => {
                    host.deliver(token, permissions);
                }
                Ok(Ok(false)) => {
                    host.deliver(token, std::iter::empty::<HostPermission>());
                }
                Ok(Err(e)) => {
                    prompt_console.print_error(&format!("could not read answer: {}", e));
                    host.abandon(token, e.to_string());
                }
                Err(e) => {
                    prompt_console.print_error(&format!("prompt task failed: {}", e));
                    host.abandon(token, e.to_string());
                }
            }
        }
    });

    let intake = controller.on_capability_request(origin, capabilities);
    tracing::info!(request_id = %intake.handle.id(), state = %intake.state, "Request submitted");
    if !intake.is_immediate() {
        console.print_system("Waiting for the host to answer the permission prompt");
    }

    let resolution = resolutions
        .recv()
        .await
        .ok_or_else(|| anyhow::anyhow!("broker stopped before resolving the request"))?;

    console.print_resolution(&resolution);
    println!("{}", serde_json::to_string_pretty(&resolution)?);

    tracing::info!("=== Permission Broker Shutting Down ===");

    Ok(())
}
