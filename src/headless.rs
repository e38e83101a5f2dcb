// ============================================================================
// headless.rs — Luxtree
// Windowless runner: drives the scene at a fixed simulated refresh next to
// the live sensing loop, logging state and progress once per second.
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::control::ControlContext;
use crate::scene::Scene;
use crate::sensing::start_sensing;

#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub seconds: u32,
    pub tick_hz: u32,
    /// Pace ticks against the wall clock; needed when a real sensing loop runs.
    pub realtime: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            seconds: 30,
            tick_hz: 60,
            realtime: true,
        }
    }
}

/// Per-second log line, also returned for inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessReport {
    pub second: u32,
    pub state: &'static str,
    pub progress: Vec<(String, f32)>,
}

pub fn run_headless(
    config: &HeadlessConfig,
    app_config: &AppConfig,
    runtime: &tokio::runtime::Runtime,
) -> Result<Vec<HeadlessReport>, String> {
    if config.tick_hz == 0 {
        return Err(String::from("Headless tick rate must be > 0"));
    }

    let control = Arc::new(ControlContext::default());
    let sensing = start_sensing(runtime.handle(), app_config, Arc::clone(&control));
    let realtime = config.realtime && sensing.is_some();

    let mut scene = Scene::new(&app_config.scene);
    log::info!(
        "Headless run started: {}s at {} Hz, {} entities, {}",
        config.seconds,
        config.tick_hz,
        scene.entity_count(),
        if realtime { "paced" } else { "unpaced" }
    );

    let reports = runtime.block_on(async {
        let period = Duration::from_secs_f64(1.0 / config.tick_hz as f64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let pace = if realtime { Some(&mut ticker) } else { None };
        drive(&mut scene, &control, config, pace).await
    });

    if let Some(handle) = sensing {
        if let Err(e) = runtime.block_on(handle.stop()) {
            log::warn!("Sensing task ended abnormally: {}", e);
        }
    }
    Ok(reports)
}

async fn drive(
    scene: &mut Scene,
    control: &ControlContext,
    config: &HeadlessConfig,
    mut pace: Option<&mut tokio::time::Interval>,
) -> Vec<HeadlessReport> {
    let dt = 1.0 / config.tick_hz as f32;
    let started = Instant::now();
    let mut reports = Vec::with_capacity(config.seconds as usize);

    for second in 1..=config.seconds {
        for _ in 0..config.tick_hz {
            if let Some(ticker) = pace.as_deref_mut() {
                ticker.tick().await;
            }
            let snapshot = control.snapshot();
            scene.tick(&snapshot, dt);
        }

        let report = HeadlessReport {
            second,
            state: control.discrete_state().name(),
            progress: scene
                .groups
                .iter()
                .map(|g| (g.name().to_string(), g.progress()))
                .collect(),
        };
        let groups: Vec<String> = report
            .progress
            .iter()
            .map(|(name, p)| format!("{name}={p:.3}"))
            .collect();
        log::info!(
            "t={}s state={} {} | status: {} | wall {:.1}s",
            second,
            report.state,
            groups.join(" "),
            control.status().text,
            started.elapsed().as_secs_f32()
        );
        reports.push(report);
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_groups, Cli, SceneConfig};
    use crate::morph::DiscreteState;

    fn tiny_config() -> AppConfig {
        let mut groups = default_groups();
        for g in &mut groups {
            g.count = 8;
        }
        AppConfig {
            scene: SceneConfig {
                groups,
                seed: Some(3),
                ..SceneConfig::default()
            },
            ..AppConfig::resolve(&Cli::default()).unwrap()
        }
    }

    #[test]
    fn reports_once_per_second_without_vision() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let config = HeadlessConfig {
            seconds: 3,
            ..HeadlessConfig::default()
        };
        let reports = run_headless(&config, &tiny_config(), &runtime).unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2].second, 3);
        assert!(reports.iter().all(|r| r.state == "FORMED"));
        assert!(reports[0].progress.iter().all(|(_, p)| *p == 1.0));
    }

    #[test]
    fn chaos_override_is_picked_up_each_tick() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let app_config = tiny_config();
        let mut scene = Scene::new(&app_config.scene);
        let control = ControlContext::default();
        control.set_discrete_state(DiscreteState::Chaos);

        let config = HeadlessConfig {
            seconds: 1,
            tick_hz: 60,
            realtime: false,
        };
        let reports = runtime.block_on(drive(&mut scene, &control, &config, None));
        let gold = reports[0]
            .progress
            .iter()
            .find(|(n, _)| n == "gold_baubles")
            .map(|(_, p)| *p)
            .unwrap();
        assert!((gold - 0.301).abs() < 1e-3);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let config = HeadlessConfig {
            tick_hz: 0,
            ..HeadlessConfig::default()
        };
        assert!(run_headless(&config, &tiny_config(), &runtime).is_err());
    }
}
