pub mod input;
pub mod timing;

use crate::assets::fetch::{Dispatch, HttpFetcher};
use crate::assets::ModelSource;
use crate::config::{ViewerConfig, CONFIG_FILE_NAME};
use crate::scene::material::MaterialSelection;
use crate::session::{LoadStatus, ViewerSession};
use crate::ui::{UiAction, UiState};
use input::Shortcut;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const APP_TITLE: &str = "Jewel Viewer";
const MODEL_EXTENSIONS: [&str; 2] = ["glb", "gltf"];

pub struct ViewerApp {
    session: ViewerSession,
    ui: UiState,
    texture: Option<egui::TextureHandle>,
}

impl ViewerApp {
    pub fn new(config: ViewerConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(config.max_download_bytes));
        Self {
            session: ViewerSession::new(config, fetcher, Dispatch::Background, Instant::now()),
            ui: UiState::new(),
            texture: None,
        }
    }

    fn handle_action(&mut self, ctx: &egui::Context, action: UiAction) {
        match action {
            UiAction::Metal(preset) => self.session.apply_metal(preset),
            UiAction::CustomColor(color) => {
                self.session.apply_material(MaterialSelection::Custom(color))
            }
            UiAction::CustomHex(text) => {
                // Rejections are logged and surfaced in the status line.
                let _ = self.session.set_custom_color(&text);
            }
            UiAction::Lighting(preset) => self.session.set_lighting(preset),
            UiAction::Camera(preset) => self.session.select_camera(preset),
            UiAction::ZoomToFit => self.session.zoom_to_fit(),
            UiAction::ToggleAutoRotate => self.session.toggle_auto_rotate(),
            UiAction::ToggleFullscreen => self.toggle_fullscreen(ctx),
            UiAction::Screenshot => {
                let _ = self.session.capture_screenshot();
            }
            UiAction::OpenFile => self.handle_open_model_action(),
            UiAction::LoadUrl(url) => {
                let _ = self.session.load_model(ModelSource::Url(url));
            }
            UiAction::ResetModel => self.session.reset_model(),
        }
    }

    fn handle_shortcut(&mut self, ctx: &egui::Context, shortcut: Shortcut) {
        match shortcut {
            Shortcut::ToggleAutoRotate => self.session.toggle_auto_rotate(),
            Shortcut::ToggleFullscreen => self.toggle_fullscreen(ctx),
            Shortcut::ToggleStats => self.session.toggle_stats(),
            Shortcut::Screenshot => {
                let _ = self.session.capture_screenshot();
            }
            Shortcut::Camera(preset) => self.session.select_camera(preset),
        }
    }

    fn toggle_fullscreen(&mut self, ctx: &egui::Context) {
        let fullscreen = self.session.toggle_fullscreen();
        ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(fullscreen));
    }

    fn handle_open_model_action(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("glTF", &MODEL_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        log::info!("Opening model: {}", path.display());
        let _ = self.session.load_model(ModelSource::File(path));
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());
        // One active model at a time: only the last dropped model counts.
        let Some(source) = dropped.into_iter().filter_map(dropped_model_source).last() else {
            return;
        };
        let _ = self.session.load_model(source);
    }

    fn show_notifications(&mut self) {
        for notification in self.session.take_notifications() {
            let _ = rfd::MessageDialog::new()
                .set_level(rfd::MessageLevel::Error)
                .set_title(notification.title.as_str())
                .set_description(notification.message.as_str())
                .set_buttons(rfd::MessageButtons::Ok)
                .show();
        }
    }

    fn show_viewport(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let (response, painter) =
                    ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
                let rect = response.rect;

                if response.dragged_by(egui::PointerButton::Primary) {
                    let delta = response.drag_delta();
                    self.session.orbit(delta.x, delta.y);
                } else if response.dragged_by(egui::PointerButton::Secondary)
                    || response.dragged_by(egui::PointerButton::Middle)
                {
                    let delta = response.drag_delta();
                    self.session.pan(delta.x, delta.y);
                }
                if response.hovered() {
                    let scroll = ui.input(|i| i.smooth_scroll_delta.y);
                    if scroll != 0.0 {
                        self.session.zoom(scroll);
                    }
                }

                // The framebuffer tracks physical pixels, not egui points.
                let pixels_per_point = ctx.pixels_per_point();
                self.session
                    .set_viewport(rect.width() * pixels_per_point, rect.height() * pixels_per_point);
                let report = self.session.tick(Instant::now());

                let (pixels, (width, height)) = self.session.frame();
                if pixels.len() != width * height * 4 || width == 0 || height == 0 {
                    return;
                }
                let image = egui::ColorImage::from_rgba_unmultiplied([width, height], pixels);
                if let Some(texture) = self.texture.as_mut() {
                    texture.set(image, egui::TextureOptions::LINEAR);
                } else {
                    self.texture = Some(ctx.load_texture(
                        "viewer_frame",
                        image,
                        egui::TextureOptions::LINEAR,
                    ));
                }
                let Some(texture) = self.texture.as_ref() else {
                    return;
                };
                painter.image(
                    texture.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );

                let state = self.session.state();
                if state.show_stats {
                    crate::ui::show_stats(ctx, state, report, rect.min);
                }
                if let LoadStatus::Loading { label } = &state.load_status {
                    crate::ui::show_loading(ctx, rect.center(), &format!("Loading {}", label));
                } else if self.session.environment_loading() {
                    crate::ui::show_loading(ctx, rect.center(), "Loading lighting");
                }
            });
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for shortcut in input::collect_shortcuts(ctx) {
            self.handle_shortcut(ctx, shortcut);
        }
        self.handle_dropped_files(ctx);

        let actions = self.ui.show(ctx, self.session.state());
        for action in actions {
            self.handle_action(ctx, action);
        }

        self.show_viewport(ctx);
        self.show_notifications();
        ctx.request_repaint();
    }
}

fn has_model_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MODEL_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Dropped bytes win over paths; `.gltf` with sidecar files needs the path.
fn dropped_model_source(file: egui::DroppedFile) -> Option<ModelSource> {
    let path: Option<PathBuf> = file.path;
    let name = match (&path, file.name.is_empty()) {
        (Some(path), true) => path.file_name()?.to_string_lossy().to_string(),
        _ => file.name,
    };
    if !has_model_extension(&name) {
        log::warn!("Ignoring dropped file {}: not a .glb or .gltf", name);
        return None;
    }
    match (file.bytes, path) {
        (Some(bytes), _) => Some(ModelSource::Bytes { name, bytes }),
        (None, Some(path)) => Some(ModelSource::File(path)),
        (None, None) => None,
    }
}

pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = ViewerConfig::load_or_default(Path::new(CONFIG_FILE_NAME));
    log::info!("{} starting ({}x{})", APP_TITLE, config.window_size[0], config.window_size[1]);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(config.window_size)
            .with_title(APP_TITLE)
            .with_drag_and_drop(true),
        ..Default::default()
    };
    if let Err(err) = eframe::run_native(
        APP_TITLE,
        options,
        Box::new(move |_cc| Ok(Box::new(ViewerApp::new(config)))),
    ) {
        log::error!("Viewer exited with an error: {}", err);
    }
    log::info!("Goodbye");
}
