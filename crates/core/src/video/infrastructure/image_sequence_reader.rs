use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::FrameSource;

/// Reads a single image, or a directory of images sorted by file name, as
/// a frame sequence at a fixed nominal rate.
///
/// Frame `i` is stamped `round(i * 1e9 / fps)` ns. Images are decoded
/// lazily; one whose size differs from the first is reported as an error
/// for that frame.
pub struct ImageSequenceReader {
    fps: f64,
    paths: Vec<PathBuf>,
    metadata: Option<VideoMetadata>,
}

impl ImageSequenceReader {
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            paths: Vec::new(),
            metadata: None,
        }
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn decode(path: &Path, timestamp_ns: u64) -> Result<Frame, Box<dyn std::error::Error>> {
    let image = image::open(path)
        .map_err(|e| format!("failed to decode {}: {e}", path.display()))?
        .to_rgb8();
    Ok(Frame::from_rgb_image(image, timestamp_ns))
}

impl FrameSource for ImageSequenceReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        let paths = if path.is_dir() {
            list_images(path)?
        } else if is_image_file(path) {
            vec![path.to_path_buf()]
        } else {
            return Err(format!("{} is not an image or a directory", path.display()).into());
        };

        let first = paths
            .first()
            .ok_or_else(|| format!("no images found in {}", path.display()))?;
        let (width, height) = image::image_dimensions(first)
            .map_err(|e| format!("failed to read {}: {e}", first.display()))?;

        let metadata = VideoMetadata {
            width,
            height,
            fps: self.fps,
            total_frames: paths.len(),
            source_path: Some(path.to_path_buf()),
        };
        log::info!(
            "Opened {} image(s) at {}x{} from {}",
            paths.len(),
            width,
            height,
            path.display()
        );
        self.paths = paths;
        self.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let Some(metadata) = self.metadata.as_ref() else {
            return Box::new(std::iter::once(Err(
                "ImageSequenceReader: not opened".into()
            )));
        };

        Box::new(self.paths.iter().enumerate().map(
            move |(index, path)| -> Result<Frame, Box<dyn std::error::Error>> {
                let frame = decode(path, metadata.timestamp_ns(index))?;
                if (frame.width(), frame.height()) != (metadata.width, metadata.height) {
                    return Err(format!(
                        "{} is {}x{}, expected {}x{}",
                        path.display(),
                        frame.width(),
                        frame.height(),
                        metadata.width,
                        metadata.height
                    )
                    .into());
                }
                Ok(frame)
            },
        ))
    }

    fn close(&mut self) {
        self.paths.clear();
        self.metadata = None;
    }
}
