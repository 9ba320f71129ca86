use crate::render::CameraPreset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    ToggleAutoRotate,
    ToggleFullscreen,
    ToggleStats,
    Screenshot,
    Camera(CameraPreset),
}

pub fn shortcut_for(key: egui::Key) -> Option<Shortcut> {
    use egui::Key;
    let digit = match key {
        Key::R => return Some(Shortcut::ToggleAutoRotate),
        Key::F => return Some(Shortcut::ToggleFullscreen),
        Key::I => return Some(Shortcut::ToggleStats),
        Key::P => return Some(Shortcut::Screenshot),
        Key::Num1 => 1,
        Key::Num2 => 2,
        Key::Num3 => 3,
        Key::Num4 => 4,
        Key::Num5 => 5,
        _ => return None,
    };
    CameraPreset::from_digit(digit).map(Shortcut::Camera)
}

/// Unmodified key presses from this frame; nothing while a text field has focus.
pub fn collect_shortcuts(ctx: &egui::Context) -> Vec<Shortcut> {
    if ctx.wants_keyboard_input() {
        return Vec::new();
    }
    ctx.input(|input| {
        input
            .events
            .iter()
            .filter_map(|event| match event {
                egui::Event::Key {
                    key,
                    pressed: true,
                    repeat: false,
                    modifiers,
                    ..
                } if modifiers.is_none() => shortcut_for(*key),
                _ => None,
            })
            .collect()
    })
}
