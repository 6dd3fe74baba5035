//! Color palette and style constants for the dashboard.

use ratatui::style::{Color, Modifier, Style};

// ── Color palette ─────────────────────────────────────────────────────────────

pub const C_BG: Color = Color::Rgb(16, 18, 22);
pub const C_ACCENT: Color = Color::Rgb(110, 170, 255);
pub const C_LIVE: Color = Color::Rgb(90, 210, 130);
pub const C_LOADING: Color = Color::Rgb(240, 190, 90);
pub const C_ERROR: Color = Color::Rgb(235, 90, 90);
pub const C_MUTED: Color = Color::Rgb(88, 92, 104);
pub const C_SECONDARY: Color = Color::Rgb(130, 136, 150);
pub const C_PRIMARY: Color = Color::Rgb(220, 222, 230);
pub const C_PANEL_BORDER: Color = Color::Rgb(48, 52, 62);
pub const C_CARD_VALUE: Color = Color::Rgb(245, 245, 250);
pub const C_CODE: Color = Color::Rgb(150, 200, 160);

// ── Predefined styles ─────────────────────────────────────────────────────────

pub fn style_default() -> Style {
    Style::new().fg(C_PRIMARY)
}

pub fn style_secondary() -> Style {
    Style::new().fg(C_SECONDARY)
}

pub fn style_muted() -> Style {
    Style::new().fg(C_MUTED)
}

pub fn style_error() -> Style {
    Style::new().fg(C_ERROR)
}

pub fn style_title() -> Style {
    Style::new().fg(C_ACCENT).add_modifier(Modifier::BOLD)
}

pub fn style_border() -> Style {
    Style::new().fg(C_PANEL_BORDER)
}

pub fn style_card_value() -> Style {
    Style::new().fg(C_CARD_VALUE).add_modifier(Modifier::BOLD)
}

pub fn style_header_row() -> Style {
    Style::new().fg(C_SECONDARY).add_modifier(Modifier::BOLD)
}

pub fn style_code() -> Style {
    Style::new().fg(C_CODE)
}
