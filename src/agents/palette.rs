// Round-robin color assignment for agents

/// Colors handed out when no palette is configured
pub const DEFAULT_PALETTE: [&str; 8] = [
    "#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899", "#14b8a6", "#f97316",
];

/// Fixed palette cycled in registration order.
/// Colors are reused once every entry has been handed out.
#[derive(Debug, Clone)]
pub struct ColorPalette {
    colors: Vec<String>,
    next: usize,
}

impl ColorPalette {
    /// Build a palette; an empty list falls back to [`DEFAULT_PALETTE`]
    pub fn new(colors: Vec<String>) -> Self {
        let colors = if colors.is_empty() {
            default_colors()
        } else {
            colors
        };
        Self { colors, next: 0 }
    }

    /// Take the next color and advance the cursor
    pub fn next_color(&mut self) -> String {
        let color = self.colors[self.next % self.colors.len()].clone();
        self.next = (self.next + 1) % self.colors.len();
        color
    }

    pub fn colors(&self) -> &[String] {
        &self.colors
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::new(default_colors())
    }
}

pub fn default_colors() -> Vec<String> {
    DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
}
