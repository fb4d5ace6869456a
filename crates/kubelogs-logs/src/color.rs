use crossterm::style::{Color, Stylize, style};

/// Colors handed out to pods, in discovery order
pub const DEFAULT_PALETTE: &[Color] = &[
    Color::Cyan,
    Color::Green,
    Color::Magenta,
    Color::Yellow,
    Color::Blue,
    Color::Red,
    Color::DarkCyan,
    Color::DarkGreen,
    Color::DarkMagenta,
    Color::DarkYellow,
];

/// Color returned for every pod when coloring is off
pub const NEUTRAL: Color = Color::Reset;

/// Assigns each pod a color from a fixed palette by discovery index
#[derive(Clone, Debug)]
pub struct ColorAllocator {
    palette: Vec<Color>,
    enabled: bool,
}

impl ColorAllocator {
    /// Create an allocator; an empty palette falls back to [`DEFAULT_PALETTE`]
    pub fn new(palette: Vec<Color>, enabled: bool) -> Self {
        let palette = if palette.is_empty() {
            DEFAULT_PALETTE.to_vec()
        } else {
            palette
        };
        Self { palette, enabled }
    }

    /// An allocator that never colors anything
    pub fn disabled() -> Self {
        Self::new(Vec::new(), false)
    }

    /// Color for the pod at `index`; palettes shorter than the pod count wrap
    pub fn color_for(&self, index: usize) -> Color {
        if !self.enabled {
            return NEUTRAL;
        }
        self.palette[index % self.palette.len()]
    }
}

impl Default for ColorAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE.to_vec(), true)
    }
}

/// Render `text` in `color`; the neutral color renders plain text
pub fn paint(text: &str, color: Color) -> String {
    if color == NEUTRAL {
        text.to_string()
    } else {
        style(text).with(color).to_string()
    }
}

/// Parse a color name as used in the config file (`cyan`, `dark_green`, ...)
pub fn parse_color(name: &str) -> Option<Color> {
    let normalized = name.trim().to_lowercase().replace(['-', ' '], "_");
    let color = match normalized.as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" => Color::White,
        "grey" | "gray" => Color::Grey,
        "dark_grey" | "dark_gray" => Color::DarkGrey,
        "dark_red" => Color::DarkRed,
        "dark_green" => Color::DarkGreen,
        "dark_yellow" => Color::DarkYellow,
        "dark_blue" => Color::DarkBlue,
        "dark_magenta" => Color::DarkMagenta,
        "dark_cyan" => Color::DarkCyan,
        _ => return None,
    };
    Some(color)
}
