use {
    crate::{
        catalog::Marker,
        matching::{Correlator, NormalizedCrossCorrelation},
    },
    anyhow::Context as _,
    derive_more::Display,
    image::{ImageReader, RgbaImage},
    mechbot_desktop::Desktop,
    std::path::Path,
    tracing::{debug, warn},
};

/// Absolute pixel position on the primary display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("({x}, {y})")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Outcome of one `locate` query. Never cached: the screen changes between
/// queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Center of the best match, present only if the marker's threshold was met.
    pub location: Option<Point>,
    /// Best correlation score; 0 if the template could not be evaluated.
    pub confidence: f32,
}

impl MatchResult {
    pub fn not_found() -> Self {
        Self {
            location: None,
            confidence: 0.0,
        }
    }

    pub fn is_found(&self) -> bool {
        self.location.is_some()
    }
}

pub trait Screen {
    fn capture(&mut self) -> anyhow::Result<RgbaImage>;
}

impl Screen for Desktop {
    fn capture(&mut self) -> anyhow::Result<RgbaImage> {
        self.capture_primary_screen()
    }
}

pub trait TemplateSource {
    /// Loads a template with its alpha channel intact.
    fn load(&self, path: &Path) -> anyhow::Result<RgbaImage>;
}

/// Reads templates from disk on every query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFiles;

impl TemplateSource for ImageFiles {
    fn load(&self, path: &Path) -> anyhow::Result<RgbaImage> {
        let reader =
            ImageReader::open(path).with_context(|| format!("failed to open image {:?}", path))?;
        let image = reader
            .decode()
            .with_context(|| format!("failed to decode image {:?}", path))?;
        Ok(image.into_rgba8())
    }
}

pub trait Locator {
    fn locate(&mut self, marker: &Marker) -> MatchResult;
}

pub struct Perception {
    screen: Box<dyn Screen>,
    templates: Box<dyn TemplateSource>,
    correlator: Box<dyn Correlator>,
}

impl Perception {
    pub fn new(
        screen: impl Screen + 'static,
        templates: impl TemplateSource + 'static,
        correlator: impl Correlator + 'static,
    ) -> Self {
        Self {
            screen: Box::new(screen),
            templates: Box::new(templates),
            correlator: Box::new(correlator),
        }
    }

    /// Live desktop, templates from disk, zero-mean normalized cross-correlation.
    pub fn desktop(desktop: Desktop) -> Self {
        Self::new(desktop, ImageFiles, NormalizedCrossCorrelation)
    }
}

impl Locator for Perception {
    /// Missing or unreadable templates and failed captures are reported as
    /// "not found", never as errors.
    fn locate(&mut self, marker: &Marker) -> MatchResult {
        if !marker.template.is_file() {
            debug!(marker = %marker.id, "template file not found: {:?}", marker.template);
            return MatchResult::not_found();
        }
        let template = match self.templates.load(&marker.template) {
            Ok(template) => template,
            Err(err) => {
                warn!(marker = %marker.id, "failed to load template: {err:?}");
                return MatchResult::not_found();
            }
        };
        let screen = match self.screen.capture() {
            Ok(screen) => screen,
            Err(err) => {
                warn!(marker = %marker.id, "failed to capture screen: {err:?}");
                return MatchResult::not_found();
            }
        };
        let Some(peak) = self.correlator.best_match(&screen, &template) else {
            debug!(marker = %marker.id, "template cannot be aligned with the screen");
            return MatchResult::not_found();
        };

        if !marker.threshold.accepts(peak.score) {
            debug!(
                marker = %marker.id,
                confidence = peak.score,
                threshold = marker.threshold.value(),
                "not found"
            );
            return MatchResult {
                location: None,
                confidence: peak.score,
            };
        }
        let center = Point::new(
            (peak.x + template.width() / 2) as i32,
            (peak.y + template.height() / 2) as i32,
        );
        debug!(
            marker = %marker.id,
            confidence = peak.score,
            "found at {}",
            center
        );
        MatchResult {
            location: Some(center),
            confidence: peak.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            catalog::{MarkerId, Threshold},
            matching::{
                tests::{crop, pattern},
                Peak,
            },
        },
        std::{collections::BTreeMap, path::PathBuf},
    };

    struct StillScreen(RgbaImage);

    impl Screen for StillScreen {
        fn capture(&mut self) -> anyhow::Result<RgbaImage> {
            Ok(self.0.clone())
        }
    }

    struct BrokenScreen;

    impl Screen for BrokenScreen {
        fn capture(&mut self) -> anyhow::Result<RgbaImage> {
            anyhow::bail!("display is gone")
        }
    }

    struct MemoryTemplates(BTreeMap<PathBuf, RgbaImage>);

    impl TemplateSource for MemoryTemplates {
        fn load(&self, path: &Path) -> anyhow::Result<RgbaImage> {
            self.0.get(path).cloned().context("unreadable template")
        }
    }

    struct FixedScore(f32);

    impl Correlator for FixedScore {
        fn best_match(&self, _image: &RgbaImage, _template: &RgbaImage) -> Option<Peak> {
            Some(Peak {
                x: 100,
                y: 40,
                score: self.0,
            })
        }
    }

    /// Marker backed by a real (empty) file so that the existence check passes.
    fn marker_on_disk(dir: &tempfile::TempDir, threshold: f32) -> Marker {
        let template = dir.path().join("OK.png");
        fs_err::write(&template, b"").unwrap();
        Marker {
            id: MarkerId::Ok,
            template,
            threshold: Threshold::new(threshold).unwrap(),
        }
    }

    fn templates_for(marker: &Marker, image: RgbaImage) -> MemoryTemplates {
        MemoryTemplates(BTreeMap::from([(marker.template.clone(), image)]))
    }

    #[test]
    fn reports_center_of_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_on_disk(&dir, 0.8);
        let screen = pattern(80, 60, 7);
        let template = crop(&screen, 30, 12, 10, 6);
        let mut perception = Perception::new(
            StillScreen(screen),
            templates_for(&marker, template),
            NormalizedCrossCorrelation,
        );

        let result = perception.locate(&marker);
        assert_eq!(result.location, Some(Point::new(35, 15)));
        assert!(result.confidence > 0.999);
    }

    #[test]
    fn confidence_below_marker_threshold_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_on_disk(&dir, 0.95);
        let mut perception = Perception::new(
            StillScreen(RgbaImage::new(200, 100)),
            templates_for(&marker, RgbaImage::new(10, 10)),
            FixedScore(0.94),
        );

        let result = perception.locate(&marker);
        assert_eq!(result.location, None);
        assert_eq!(result.confidence, 0.94);

        let lenient = marker.with_threshold(Threshold::new(0.9).unwrap());
        assert_eq!(
            perception.locate(&lenient).location,
            Some(Point::new(105, 45))
        );
    }

    #[test]
    fn confidence_equal_to_threshold_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_on_disk(&dir, 0.95);
        let mut perception = Perception::new(
            StillScreen(RgbaImage::new(200, 100)),
            templates_for(&marker, RgbaImage::new(10, 10)),
            FixedScore(0.95),
        );
        assert!(perception.locate(&marker).is_found());
    }

    #[test]
    fn missing_template_file_is_not_found() {
        let marker = Marker {
            id: MarkerId::Victory,
            template: PathBuf::from("/definitely/not/here/Victory.png"),
            threshold: Threshold::DEFAULT,
        };
        let mut perception = Perception::new(
            StillScreen(RgbaImage::new(10, 10)),
            MemoryTemplates(BTreeMap::new()),
            FixedScore(1.0),
        );
        assert_eq!(perception.locate(&marker), MatchResult::not_found());
    }

    #[test]
    fn unreadable_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_on_disk(&dir, 0.8);
        let mut perception = Perception::new(
            StillScreen(RgbaImage::new(10, 10)),
            ImageFiles,
            FixedScore(1.0),
        );
        assert_eq!(perception.locate(&marker), MatchResult::not_found());
    }

    #[test]
    fn capture_failure_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_on_disk(&dir, 0.8);
        let mut perception = Perception::new(
            BrokenScreen,
            templates_for(&marker, RgbaImage::new(4, 4)),
            FixedScore(1.0),
        );
        assert_eq!(perception.locate(&marker), MatchResult::not_found());
    }

    #[test]
    fn repeated_queries_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_on_disk(&dir, 0.5);
        let screen = pattern(50, 50, 3);
        let template = pattern(8, 8, 11);
        let mut perception = Perception::new(
            StillScreen(screen),
            templates_for(&marker, template),
            NormalizedCrossCorrelation,
        );
        assert_eq!(perception.locate(&marker), perception.locate(&marker));
    }
}
