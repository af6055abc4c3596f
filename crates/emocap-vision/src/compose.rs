//! Themed overlay composition for captured moments.
//!
//! Two kinds of decoration exist:
//!
//! - **Normal** overlays are mood-matched stickers, resized to a small square
//!   and drawn at the center of the base image, which is faded to 70% opacity
//!   beneath them.
//! - **Special** overlays are full-bleed frames usable for any emotion; the
//!   base image keeps full opacity and the overlay covers it entirely.
//!
//! Assets are loaded once into an [`OverlayLibrary`]. Selection is uniform
//! over the normal overlays matching the label plus every special overlay.

use emocap_models::{EmotionLabel, OverlayKind};
use image::imageops::FilterType;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::crop::save_jpeg;
use crate::error::{VisionError, VisionResult};

/// Sticker file names per mood.
pub fn normal_overlays_for(label: EmotionLabel) -> &'static [&'static str] {
    const CHEERFUL: &[&str] = &["BaiSongLe.png", "BianShaLe.png", "GaoXingLe.png", "MaiDiaoLe.png"];
    const ANGRY: &[&str] = &["ShengQiLe.png", "TaoYanLe.png", "QuQiangLe.png"];
    const SAD: &[&str] = &["HaiPaLe.png", "NanGuoLe.png", "MaiBuDiaoLe.png"];

    match label {
        EmotionLabel::Happy | EmotionLabel::Surprise => CHEERFUL,
        EmotionLabel::Angry => ANGRY,
        EmotionLabel::Sad => SAD,
        _ => &[],
    }
}

/// Composition parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerConfig {
    /// Directory holding the normal overlays
    pub sources_dir: PathBuf,
    /// Directory holding the special overlays (every PNG inside is used)
    pub special_dir: PathBuf,
    /// Side of a normal overlay once resized
    pub normal_size: u32,
    /// Side of the base image and of special overlays
    pub canvas_size: u32,
    /// Opacity of the base image under a normal overlay
    pub base_opacity: f32,
    pub jpeg_quality: u8,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self::with_sources_dir("sources")
    }
}

impl ComposerConfig {
    /// Defaults rooted at a different asset directory.
    pub fn with_sources_dir(dir: impl Into<PathBuf>) -> Self {
        let sources_dir = dir.into();
        Self {
            special_dir: sources_dir.join("special"),
            sources_dir,
            normal_size: 240,
            canvas_size: 480,
            base_opacity: 0.7,
            jpeg_quality: 95,
        }
    }
}

/// A candidate decoration.
#[derive(Debug, Clone, Copy)]
pub struct OverlayChoice<'a> {
    pub kind: OverlayKind,
    pub name: &'a str,
    pub image: &'a RgbaImage,
}

/// Preloaded, pre-resized overlay assets.
#[derive(Debug, Default)]
pub struct OverlayLibrary {
    normal: HashMap<String, RgbaImage>,
    special: Vec<(String, RgbaImage)>,
}

impl OverlayLibrary {
    /// Load every known asset. Missing or unreadable files are logged and
    /// skipped; an empty library is valid.
    pub fn load(config: &ComposerConfig) -> Self {
        let mut library = Self::default();

        let mut names: Vec<&str> = [EmotionLabel::Happy, EmotionLabel::Angry, EmotionLabel::Sad]
            .into_iter()
            .flat_map(normal_overlays_for)
            .copied()
            .collect();
        names.dedup();

        for name in names {
            let path = config.sources_dir.join(name);
            if !path.exists() {
                warn!(path = %path.display(), "Overlay asset missing");
                continue;
            }
            match load_resized(&path, config.normal_size) {
                Ok(img) => {
                    library.normal.insert(name.to_string(), img);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to load overlay"),
            }
        }

        match std::fs::read_dir(&config.special_dir) {
            Ok(entries) => {
                let mut paths: Vec<PathBuf> = entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| {
                        p.extension()
                            .and_then(|ext| ext.to_str())
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
                    })
                    .collect();
                paths.sort();
                for path in paths {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    match load_resized(&path, config.canvas_size) {
                        Ok(img) => library.special.push((name, img)),
                        Err(e) => warn!(path = %path.display(), error = %e, "Failed to load special overlay"),
                    }
                }
            }
            Err(_) => debug!(dir = %config.special_dir.display(), "No special overlay directory"),
        }

        info!(
            normal = library.normal.len(),
            special = library.special.len(),
            "Overlay library loaded"
        );
        library
    }

    /// Add a normal overlay directly (already sized).
    pub fn insert_normal(&mut self, name: impl Into<String>, image: RgbaImage) {
        self.normal.insert(name.into(), image);
    }

    /// Add a special overlay directly (already sized).
    pub fn insert_special(&mut self, name: impl Into<String>, image: RgbaImage) {
        self.special.push((name.into(), image));
    }

    pub fn normal_count(&self) -> usize {
        self.normal.len()
    }

    pub fn special_count(&self) -> usize {
        self.special.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normal.is_empty() && self.special.is_empty()
    }

    /// Every overlay eligible for a label.
    pub fn eligible(&self, label: EmotionLabel) -> Vec<OverlayChoice<'_>> {
        let normal = normal_overlays_for(label).iter().filter_map(|name| {
            self.normal.get_key_value(*name).map(|(name, image)| OverlayChoice {
                kind: OverlayKind::Normal,
                name: name.as_str(),
                image,
            })
        });
        let special = self.special.iter().map(|(name, image)| OverlayChoice {
            kind: OverlayKind::Special,
            name: name.as_str(),
            image,
        });
        normal.chain(special).collect()
    }

    /// Uniform pick over [`OverlayLibrary::eligible`].
    pub fn select<R: Rng + ?Sized>(&self, label: EmotionLabel, rng: &mut R) -> Option<OverlayChoice<'_>> {
        self.eligible(label).choose(rng).copied()
    }
}

fn load_resized(path: &Path, side: u32) -> VisionResult<RgbaImage> {
    let img = image::open(path)?.to_rgba8();
    Ok(image::imageops::resize(&img, side, side, FilterType::Lanczos3))
}

/// Decorates captured images using an [`OverlayLibrary`].
#[derive(Debug)]
pub struct Compositor {
    config: ComposerConfig,
    library: OverlayLibrary,
}

impl Compositor {
    pub fn new(config: ComposerConfig, library: OverlayLibrary) -> Self {
        Self { config, library }
    }

    /// Load assets per `config`.
    pub fn load(config: ComposerConfig) -> Self {
        let library = OverlayLibrary::load(&config);
        Self::new(config, library)
    }

    pub fn library(&self) -> &OverlayLibrary {
        &self.library
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Decorate `base_path` and write a JPEG to `output_path` (which may be
    /// the same file).
    pub fn compose_file<R: Rng + ?Sized>(
        &self,
        base_path: &Path,
        label: EmotionLabel,
        output_path: &Path,
        rng: &mut R,
    ) -> VisionResult<OverlayKind> {
        if !base_path.exists() {
            return Err(VisionError::FileNotFound(base_path.to_path_buf()));
        }
        let base = image::open(base_path)?.to_rgba8();

        let choice = self
            .library
            .select(label, rng)
            .ok_or_else(|| VisionError::no_overlay(label.as_str()))?;

        let composed = self.compose(&base, &choice);
        save_jpeg(&composed, output_path, self.config.jpeg_quality)?;

        debug!(
            label = %label,
            overlay = choice.name,
            kind = %choice.kind,
            path = %output_path.display(),
            "Composed image"
        );
        Ok(choice.kind)
    }

    /// Composite in memory, flattening onto white.
    pub fn compose(&self, base: &RgbaImage, choice: &OverlayChoice<'_>) -> RgbImage {
        let side = self.config.canvas_size;
        let mut canvas = if base.dimensions() == (side, side) {
            base.clone()
        } else {
            image::imageops::resize(base, side, side, FilterType::Lanczos3)
        };

        let (ox, oy) = match choice.kind {
            OverlayKind::Normal => {
                let opacity = self.config.base_opacity.clamp(0.0, 1.0);
                for pixel in canvas.pixels_mut() {
                    pixel.0[3] = (pixel.0[3] as f32 * opacity) as u8;
                }
                (
                    side.saturating_sub(choice.image.width()) / 2,
                    side.saturating_sub(choice.image.height()) / 2,
                )
            }
            OverlayKind::Special => (0, 0),
        };

        for (x, y, over) in choice.image.enumerate_pixels() {
            let (cx, cy) = (x + ox, y + oy);
            if cx >= side || cy >= side {
                continue;
            }
            let under = canvas.get_pixel_mut(cx, cy);
            *under = paste_masked(*under, *over);
        }

        flatten_on_white(&canvas)
    }
}

/// Paste `over` onto `under` using `over`'s alpha as the mask, every channel
/// (alpha included) interpolated.
fn paste_masked(under: Rgba<u8>, over: Rgba<u8>) -> Rgba<u8> {
    let m = over.0[3] as f32 / 255.0;
    let mut out = [0u8; 4];
    for (i, channel) in out.iter_mut().enumerate() {
        *channel = (over.0[i] as f32 * m + under.0[i] as f32 * (1.0 - m)).round() as u8;
    }
    Rgba(out)
}

fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let a = p.0[3] as f32 / 255.0;
        let blend = |c: u8| (c as f32 * a + 255.0 * (1.0 - a)).round() as u8;
        Rgb([blend(p.0[0]), blend(p.0[1]), blend(p.0[2])])
    })
}
