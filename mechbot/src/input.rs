use {crate::perception::Point, mechbot_desktop::Desktop};

/// Injects clicks at absolute display coordinates.
pub trait Pointer {
    fn click(&mut self, at: Point) -> anyhow::Result<()>;
}

impl Pointer for Desktop {
    fn click(&mut self, at: Point) -> anyhow::Result<()> {
        self.left_click_at(at.x, at.y)
    }
}
