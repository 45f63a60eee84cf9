use std::io::{self, Write};
use std::sync::Mutex;

use tracing::info;

use crate::config::Modality;

/// Outputs one stimulus per tick. Fire-and-forget: must return quickly and never block the loop.
pub trait StimulusPresenter: Send + Sync + 'static {
    fn present(&self, modality: Modality, value: u32);
}

/// Presenter that only logs stimuli; useful for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl StimulusPresenter for LogPresenter {
    fn present(&self, modality: Modality, value: u32) {
        info!(%modality, value, "stimulus");
    }
}

/// Row and column of a cell in a square grid of `grid_size` cells.
pub fn grid_cell(value: u32, grid_size: u32) -> (u32, u32) {
    let side = (grid_size as f64).sqrt().ceil().max(1.0) as u32;
    (value / side, value % side)
}

/// Renders a square grid with the active cell marked.
pub fn render_grid(value: u32, grid_size: u32) -> Vec<String> {
    let side = (grid_size as f64).sqrt().ceil().max(1.0) as u32;
    let (row, col) = grid_cell(value, grid_size);
    (0..side)
        .map(|r| {
            (0..side)
                .map(|c| if r == row && c == col { "[#]" } else { "[ ]" })
                .collect::<Vec<_>>()
                .join("")
        })
        .collect()
}

/// Plain-text presenter for the terminal driver. Lines end in `\r\n` so output
/// stays aligned while the terminal is in raw mode.
pub struct ConsolePresenter<W: Write + Send + 'static> {
    out: Mutex<W>,
    grid_size: u32,
}

impl ConsolePresenter<io::Stdout> {
    pub fn stdout(grid_size: u32) -> Self {
        Self::new(io::stdout(), grid_size)
    }
}

impl<W: Write + Send + 'static> ConsolePresenter<W> {
    pub fn new(out: W, grid_size: u32) -> Self {
        Self {
            out: Mutex::new(out),
            grid_size,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn lines(&self, modality: Modality, value: u32) -> Vec<String> {
        let mut lines = Vec::new();
        if matches!(modality, Modality::Visual | Modality::AudioVisual) {
            lines.extend(render_grid(value, self.grid_size));
        }
        if matches!(modality, Modality::Audio | Modality::AudioVisual) {
            lines.push(format!("sound {}", value + 1));
        }
        lines
    }
}

impl<W: Write + Send + 'static> StimulusPresenter for ConsolePresenter<W> {
    fn present(&self, modality: Modality, value: u32) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let mut text = String::from("\r\n");
        for line in self.lines(modality, value) {
            text.push_str(&line);
            text.push_str("\r\n");
        }
        // Output is best-effort; a closed terminal must not stop the game.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_cell_on_3x3() {
        assert_eq!(grid_cell(0, 9), (0, 0));
        assert_eq!(grid_cell(4, 9), (1, 1));
        assert_eq!(grid_cell(8, 9), (2, 2));
        assert_eq!(grid_cell(5, 9), (1, 2));
    }

    #[test]
    fn render_grid_marks_single_cell() {
        let grid = render_grid(4, 9);
        assert_eq!(grid, vec!["[ ][ ][ ]", "[ ][#][ ]", "[ ][ ][ ]"]);
    }

    #[test]
    fn console_presenter_by_modality() {
        let presenter = ConsolePresenter::new(Vec::new(), 9);
        presenter.present(Modality::Audio, 2);
        let out = String::from_utf8(presenter.into_inner()).unwrap();
        assert_eq!(out, "\r\nsound 3\r\n");

        let presenter = ConsolePresenter::new(Vec::new(), 9);
        presenter.present(Modality::AudioVisual, 0);
        let out = String::from_utf8(presenter.into_inner()).unwrap();
        assert!(out.contains("[#][ ][ ]"));
        assert!(out.contains("sound 1"));
    }
}
