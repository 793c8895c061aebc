#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
use crate::windows as imp;

#[cfg(not(target_os = "windows"))]
mod other;
#[cfg(not(target_os = "windows"))]
use crate::other as imp;

use {
    anyhow::{anyhow, Context as _},
    enigo::{Button, Coordinate, Direction, Enigo, Mouse},
    image::RgbaImage,
    std::{
        sync::{Arc, Mutex, MutexGuard},
        thread::sleep,
        time::Duration,
    },
    tracing::{debug, trace},
};

/// Pause after every injected input event so that the target sees
/// the move and the click as separate events.
const INPUT_EVENT_DELAY: Duration = Duration::from_millis(50);

struct DesktopData {
    enigo: Mutex<Enigo>,
}

/// Handle to the primary display and the system mouse.
///
/// Cloning is cheap; all clones drive the same input device.
#[derive(Clone)]
pub struct Desktop(Arc<DesktopData>);

impl Desktop {
    pub fn new() -> anyhow::Result<Self> {
        imp::prepare_process()?;
        Ok(Self(Arc::new(DesktopData {
            enigo: Mutex::new(Enigo::new(&enigo::Settings::default())?),
        })))
    }

    fn enigo(&self) -> anyhow::Result<MutexGuard<'_, Enigo>> {
        self.0
            .enigo
            .lock()
            .map_err(|_| anyhow!("input device lock poisoned"))
    }

    pub fn mouse_move_global(&self, x: i32, y: i32) -> anyhow::Result<()> {
        self.enigo()?.move_mouse(x, y, Coordinate::Abs)?;
        sleep(INPUT_EVENT_DELAY);
        Ok(())
    }

    pub fn mouse_left_click(&self) -> anyhow::Result<()> {
        self.enigo()?.button(Button::Left, Direction::Click)?;
        sleep(INPUT_EVENT_DELAY);
        Ok(())
    }

    /// Moves the cursor to the global position and clicks the left button there.
    pub fn left_click_at(&self, x: i32, y: i32) -> anyhow::Result<()> {
        trace!(x, y, "left click");
        self.mouse_move_global(x, y)?;
        self.mouse_left_click()
    }

    /// Captures the whole primary monitor.
    ///
    /// Falls back to the first reported monitor if none is flagged as primary.
    pub fn capture_primary_screen(&self) -> anyhow::Result<RgbaImage> {
        let monitors = xcap::Monitor::all()?;
        let primary = monitors
            .iter()
            .find(|monitor| monitor.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())
            .context("no monitors found")?;
        let image = primary.capture_image()?;
        debug!(
            width = image.width(),
            height = image.height(),
            "captured primary screen"
        );
        Ok(image)
    }
}
