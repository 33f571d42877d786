mod cli;
mod page;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use frame_bus::LocalBus;
use host_controller::{CanvasView, HandshakeState, HostConfig, HostController, SurfaceGeometry, ViewportMapper};
use kurbo::{Point, Vec2};
use sandbox_agent::{
    stable_selector, AgentConfig, LibraryGate, SandboxAgent, SurfaceBusSubscriber, TweenRegistry,
};
use serde_json::json;
use tracing::{info, warn, Level};

use crate::cli::{Cli, Commands, DemoArgs};

const SURFACE_ORIGIN: Point = Point::new(40.0, 60.0);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Selectors) => print_selectors(),
        Some(Commands::Demo(args)) => run_demo(args).await,
        None => run_demo(cli.demo).await,
    }
}

fn init_tracing() {
    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn print_selectors() -> anyhow::Result<()> {
    let doc = page::sample_page();
    for node in page::body_elements(&doc) {
        let tag = doc.tag(node).unwrap_or_default();
        if let Some(selector) = stable_selector(&doc, node) {
            println!("{tag:<8} {selector}");
        }
    }
    Ok(())
}

async fn wait_for(limit: Duration, condition: impl Fn() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .map_err(|_| anyhow!("timed out after {limit:?}"))
}

async fn run_demo(args: DemoArgs) -> anyhow::Result<()> {
    let config = HostConfig::from_env();
    let bus = Arc::new(LocalBus::new());

    let library = LibraryGate::new();
    let agent = SandboxAgent::new(
        bus.clone(),
        page::sample_page(),
        library.clone(),
        AgentConfig {
            origin: config.expected_origin().to_string(),
            ..AgentConfig::default()
        },
    );
    let library_wait = agent.config().library_wait.unwrap_or(Duration::from_secs(10));
    SurfaceBusSubscriber::new(bus.clone()).spawn_agent_worker(agent.clone());

    if args.no_library {
        warn!("animation library disabled; animation commands will fail");
    } else {
        let delay = Duration::from_millis(args.library_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            library.install(Arc::new(TweenRegistry::new()));
            info!(delay_ms = delay.as_millis() as u64, "animation library loaded");
        });
    }

    let host = HostController::new(bus, config);
    host.spawn_event_worker();
    let geometry = SurfaceGeometry::new(SURFACE_ORIGIN, page::VIEWPORT);
    let view = CanvasView::new(Vec2::new(args.pan_x, args.pan_y), args.zoom);
    host.mount_surface(geometry);
    host.set_canvas_view(view);
    host.surface_loaded();

    wait_for(Duration::from_millis(args.handshake_timeout_ms), || {
        host.handshake_state() == HandshakeState::Ready
    })
    .await
    .context("surface never acknowledged the handshake")?;
    host.init();
    wait_for(Duration::from_secs(1), || host.editor_state().dom_tree.is_some())
        .await
        .context("no DOM tree from surface")?;

    let centre = {
        let doc = agent.document();
        let doc = doc.lock();
        let node = doc
            .query_selector(&args.target)?
            .ok_or_else(|| anyhow!("no element matches {}", args.target))?;
        doc.bounding_client_rect(node).center()
    };
    let pointer = ViewportMapper::new(geometry, view).surface_to_host() * centre;
    info!(x = pointer.x, y = pointer.y, target = %args.target, "hovering target");

    if !host.pointer_move(pointer) {
        return Err(anyhow!("target is outside the visible surface"));
    }
    wait_for(Duration::from_secs(1), || host.highlight_rect().is_some())
        .await
        .context("no highlight from surface")?;

    // The page's own hover script stays quiet while the inspector is on.
    {
        let doc = agent.document();
        let mut doc = doc.lock();
        if let Some(node) = doc.pointer_move(centre) {
            info!(
                transform = ?doc.style_property(node, "transform"),
                "page hover while inspecting"
            );
        }
    }

    host.click(pointer);
    wait_for(Duration::from_secs(1), || host.selected().is_some())
        .await
        .context("no selection from surface")?;
    let selector = host.selected().unwrap_or_default();
    info!(selector = %selector, "selected");

    let animation = match json!({"x": 100, "duration": 1}) {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    host.apply(selector.clone(), animation);
    let settled = library_wait + Duration::from_secs(1);
    wait_for(settled, || {
        let state = host.editor_state();
        state.animations.contains_key(&selector) || !state.errors.is_empty()
    })
    .await
    .context("no reply to APPLY")?;

    host.pause(selector.clone());
    host.resume(selector.clone());
    host.restart(selector.clone());
    let tweak = match json!({"backgroundColor": "#F59E0B"}) {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    host.tweak(selector.clone(), tweak);
    host.remove("#does-not-exist");
    tokio::time::sleep(Duration::from_millis(100)).await;

    host.set_inspector_mode(false);
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("{}", serde_json::to_string_pretty(&host.editor_state())?);
    Ok(())
}
