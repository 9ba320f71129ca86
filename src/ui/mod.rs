use crate::assets::environment::LightingPreset;
use crate::render::{CameraMode, CameraPreset, FrameReport};
use crate::scene::material::{MaterialSelection, MetalPreset, Rgb};
use crate::session::{LoadStatus, ViewerState};

/// What the user asked for this frame; the app applies these to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Metal(MetalPreset),
    CustomColor(Rgb),
    CustomHex(String),
    Lighting(LightingPreset),
    Camera(CameraPreset),
    ZoomToFit,
    ToggleAutoRotate,
    ToggleFullscreen,
    Screenshot,
    OpenFile,
    LoadUrl(String),
    ResetModel,
}

pub struct UiState {
    url_input: String,
    hex_input: String,
    picker: [u8; 3],
    synced_color: Option<Rgb>,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            url_input: String::new(),
            hex_input: String::new(),
            picker: [0xFF, 0xD7, 0x00],
            synced_color: None,
        }
    }

    /// Mirrors the session's custom colour into the picker and hex field.
    fn sync(&mut self, state: &ViewerState) {
        if self.synced_color != Some(state.custom_color) {
            self.synced_color = Some(state.custom_color);
            self.picker = state.custom_color.to_array();
            self.hex_input = state.custom_color.to_string();
        }
    }

    /// Trimmed URL from the input field, if any.
    fn take_url(&mut self) -> Option<String> {
        let url = self.url_input.trim();
        if url.is_empty() {
            return None;
        }
        let url = url.to_string();
        self.url_input.clear();
        Some(url)
    }

    pub fn show(&mut self, ctx: &egui::Context, state: &ViewerState) -> Vec<UiAction> {
        self.sync(state);
        let mut actions = Vec::new();

        egui::SidePanel::right("viewer_controls")
            .default_width(260.0)
            .resizable(false)
            .show(ctx, |ui| {
                ui.heading("Jewel Viewer");
                ui.separator();
                self.material_section(ui, state, &mut actions);
                ui.separator();
                lighting_section(ui, state, &mut actions);
                ui.separator();
                camera_section(ui, state, &mut actions);
                ui.separator();
                self.model_section(ui, state, &mut actions);
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Screenshot (P)").clicked() {
                        actions.push(UiAction::Screenshot);
                    }
                    let label = if state.fullscreen { "Windowed (F)" } else { "Fullscreen (F)" };
                    if ui.button(label).clicked() {
                        actions.push(UiAction::ToggleFullscreen);
                    }
                });
                if !state.status.is_empty() {
                    ui.separator();
                    ui.label(egui::RichText::new(&state.status).small());
                }
            });
        actions
    }

    fn material_section(&mut self, ui: &mut egui::Ui, state: &ViewerState, actions: &mut Vec<UiAction>) {
        ui.label("Material");
        ui.horizontal(|ui| {
            for preset in MetalPreset::ALL {
                let selected = state.material == MaterialSelection::Metal(preset);
                if ui.selectable_label(selected, preset.label()).clicked() {
                    actions.push(UiAction::Metal(preset));
                }
            }
        });
        ui.horizontal(|ui| {
            let selected = matches!(state.material, MaterialSelection::Custom(_));
            ui.label(if selected { "Custom ●" } else { "Custom" });
            if ui.color_edit_button_srgb(&mut self.picker).changed() {
                let [r, g, b] = self.picker;
                actions.push(UiAction::CustomColor(Rgb::new(r, g, b)));
            }
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.hex_input)
                    .desired_width(80.0)
                    .hint_text("#RRGGBB"),
            );
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if submitted || ui.button("Apply").clicked() {
                actions.push(UiAction::CustomHex(self.hex_input.trim().to_string()));
            }
        });
    }

    fn model_section(&mut self, ui: &mut egui::Ui, state: &ViewerState, actions: &mut Vec<UiAction>) {
        ui.label("Model");
        ui.horizontal(|ui| {
            if ui.button("Open model…").clicked() {
                actions.push(UiAction::OpenFile);
            }
            if ui.button("Reset").clicked() {
                actions.push(UiAction::ResetModel);
            }
        });
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.url_input)
                    .desired_width(170.0)
                    .hint_text("https://…/model.glb"),
            );
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if submitted || ui.button("Load").clicked() {
                if let Some(url) = self.take_url() {
                    actions.push(UiAction::LoadUrl(url));
                }
            }
        });
        if let LoadStatus::Loading { label } = &state.load_status {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(format!("Loading {}", label));
            });
        }
        ui.label(egui::RichText::new("Drop a .glb or .gltf file onto the window").weak());
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

fn lighting_section(ui: &mut egui::Ui, state: &ViewerState, actions: &mut Vec<UiAction>) {
    ui.label("Lighting");
    ui.horizontal_wrapped(|ui| {
        for preset in LightingPreset::ALL {
            if ui.selectable_label(state.lighting == preset, preset.label()).clicked() {
                actions.push(UiAction::Lighting(preset));
            }
        }
    });
}

fn camera_section(ui: &mut egui::Ui, state: &ViewerState, actions: &mut Vec<UiAction>) {
    ui.label("Camera");
    ui.horizontal_wrapped(|ui| {
        for (index, preset) in CameraPreset::ALL.into_iter().enumerate() {
            let selected = state.camera == CameraMode::Preset(preset);
            let text = format!("{} {}", index + 1, preset.label());
            if ui.selectable_label(selected, text).clicked() {
                actions.push(UiAction::Camera(preset));
            }
        }
    });
    ui.horizontal(|ui| {
        if ui.button("Zoom to fit").clicked() {
            actions.push(UiAction::ZoomToFit);
        }
        let mut auto_rotate = state.auto_rotate;
        if ui.checkbox(&mut auto_rotate, "Auto-rotate (R)").changed() {
            actions.push(UiAction::ToggleAutoRotate);
        }
    });
}

/// Fps and model counters, drawn over the viewport's top-left corner.
pub fn show_stats(ctx: &egui::Context, state: &ViewerState, frame: FrameReport, anchor: egui::Pos2) {
    egui::Area::new(egui::Id::new("viewer_stats"))
        .fixed_pos(anchor + egui::vec2(8.0, 8.0))
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.monospace(format!("FPS        {}", state.fps));
                ui.monospace(format!("Vertices   {}", state.stats.vertices));
                ui.monospace(format!("Faces      {}", state.stats.faces));
                ui.monospace(format!("Materials  {}", state.stats.materials));
                ui.monospace(format!("Drawn      {}", frame.triangles));
                ui.monospace(format!("Bloom      {}", if frame.post_processed { "on" } else { "off" }));
            });
        });
}

/// Spinner over the viewport centre while an HDRI or model is pending.
pub fn show_loading(ctx: &egui::Context, centre: egui::Pos2, text: &str) {
    egui::Area::new(egui::Id::new("viewer_loading"))
        .fixed_pos(centre - egui::vec2(60.0, 12.0))
        .interactable(false)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(text);
            });
        });
}
