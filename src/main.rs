// ============================================================================
// main.rs — Luxtree
// Entry point. Initializes logging, resolves config, owns the async runtime,
// and starts either the event loop or the headless runner.
// ============================================================================

mod analyzer;
mod app;
mod camera;
mod config;
mod control;
mod control_ui;
mod distribution;
mod emitter;
mod headless;
mod mapper;
mod mesh;
mod morph;
mod pipeline;
mod scene;
mod sensing;

use std::time::Duration;

use clap::Parser;
use winit::event_loop::EventLoop;

use app::App;
use config::{AppConfig, Cli};
use headless::{run_headless, HeadlessConfig};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = AppConfig::resolve(&cli).map_err(|e| e.to_string())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("luxtree-sensing")
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;

    if let Some(seconds) = config.headless_seconds {
        let headless = HeadlessConfig {
            seconds,
            ..HeadlessConfig::default()
        };
        run_headless(&headless, &config, &runtime)?;
    } else {
        let event_loop = EventLoop::new().map_err(|e| format!("Failed to create event loop: {e}"))?;
        event_loop.set_control_flow(winit::event_loop::ControlFlow::Poll);

        let mut app = App::new(config, runtime.handle().clone());
        event_loop
            .run_app(&mut app)
            .map_err(|e| format!("Event loop error: {e}"))?;
    }

    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
