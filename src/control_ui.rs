// ============================================================================
// control_ui.rs — Luxtree
// egui overlay: sensing status, tree state, per-group progress, and the
// manual Form / Unleash Chaos override.
// ============================================================================

use crate::config::DisplayParams;
use crate::control::ControlContext;
use crate::morph::DiscreteState;
use crate::scene::Scene;
use crate::sensing::SensingPhase;

const GOLD: egui::Color32 = egui::Color32::from_rgb(255, 215, 0);
const EMERALD: egui::Color32 = egui::Color32::from_rgb(0, 160, 70);

/// Read-only frame facts shown alongside the control cells.
pub struct FrameInfo {
    pub fps: f32,
    pub vision_enabled: bool,
    pub phase: Option<SensingPhase>,
}

/// Main entry point for the overlay.
pub fn render_control_ui(
    ctx: &egui::Context,
    params: &DisplayParams,
    control: &ControlContext,
    scene: &Scene,
    info: &FrameInfo,
) {
    if !params.show_panel {
        render_minimal_overlay(ctx, control, info);
        return;
    }

    egui::Window::new("Control Interface")
        .default_pos(egui::pos2(16.0, 16.0))
        .default_width(260.0)
        .resizable(false)
        .show(ctx, |ui| {
            render_status_section(ui, control, info);
            ui.separator();
            render_state_section(ui, control);
            ui.separator();
            render_progress_section(ui, scene);
            ui.add_space(6.0);
            ui.label(
                egui::RichText::new("Open Hand to Unleash • Close Hand to Form")
                    .small()
                    .color(egui::Color32::GRAY),
            );
        });
}

// ======================== Minimal Overlay ========================

fn render_minimal_overlay(ctx: &egui::Context, control: &ControlContext, info: &FrameInfo) {
    egui::Area::new(egui::Id::new("minimal_overlay"))
        .fixed_pos(egui::pos2(10.0, 10.0))
        .show(ctx, |ui| {
            ui.visuals_mut().override_text_color = Some(egui::Color32::from_rgb(220, 220, 220));
            ui.label(
                egui::RichText::new(format!(
                    "{}  FPS: {:.0}  | H: panel",
                    control.discrete_state().name(),
                    info.fps,
                ))
                .monospace()
                .size(13.0),
            );
        });
}

// ======================== Sections ========================

fn render_status_section(ui: &mut egui::Ui, control: &ControlContext, info: &FrameInfo) {
    let status = control.status();
    ui.horizontal(|ui| {
        let dot = match info.phase {
            Some(SensingPhase::Analyzing) => GOLD,
            Some(_) => EMERALD,
            None => egui::Color32::DARK_GRAY,
        };
        ui.colored_label(dot, "●");
        ui.label(egui::RichText::new(&status.text).strong());
    });
    ui.label(
        egui::RichText::new(format!("updated {}", status.updated_at.format("%H:%M:%S")))
            .small()
            .color(egui::Color32::GRAY),
    );
    if !info.vision_enabled {
        ui.label(egui::RichText::new("Keyboard: F form, C chaos").small());
    }
}

fn render_state_section(ui: &mut egui::Ui, control: &ControlContext) {
    let current = control.discrete_state();
    ui.horizontal(|ui| {
        ui.label("State:");
        let color = match current {
            DiscreteState::Formed => EMERALD,
            DiscreteState::Chaos => GOLD,
        };
        ui.colored_label(color, current.name());
    });

    ui.horizontal(|ui| {
        if ui
            .add_enabled(current != DiscreteState::Formed, egui::Button::new("🎄 Form"))
            .clicked()
        {
            control.set_discrete_state(DiscreteState::Formed);
        }
        if ui
            .add_enabled(current != DiscreteState::Chaos, egui::Button::new("✨ Unleash Chaos"))
            .clicked()
        {
            control.set_discrete_state(DiscreteState::Chaos);
        }
    });
}

fn render_progress_section(ui: &mut egui::Ui, scene: &Scene) {
    ui.label(format!(
        "{} entities, t = {:.1}s",
        scene.entity_count(),
        scene.elapsed()
    ));
    egui::Grid::new("progress_grid")
        .num_columns(2)
        .spacing([8.0, 4.0])
        .show(ui, |ui| {
            for group in &scene.groups {
                ui.label(group.name());
                ui.add(
                    egui::ProgressBar::new(group.progress())
                        .desired_width(150.0)
                        .text(format!("{:.0}%", group.progress() * 100.0)),
                );
                ui.end_row();
            }
        });
}
