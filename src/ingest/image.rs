/// Satellite and radar image downloader
///
/// SatelliteImage devices name a source URL and a local destination file.
/// The image is fetched on every cycle and written over the destination;
/// the destination's extension must name a common image type.

use std::path::Path;

use thiserror::Error;

use crate::config::HTTP_TIMEOUT;
use crate::logging::{self, Source};

const IMAGE_EXTENSIONS: [&str; 4] = [".gif", ".jpg", ".jpeg", ".png"];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("destination must end in .gif, .jpg, .jpeg or .png: {0}")]
    BadType(String),
    #[error("no image source URL configured")]
    MissingSource,
    #[error("could not reach {url}: {message}")]
    Connection { url: String, message: String },
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    #[error("could not write image: {0}")]
    Io(#[from] std::io::Error),
}

/// Case-insensitive check on the destination file name.
pub fn has_image_extension(destination: &str) -> bool {
    let lower = destination.trim().to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

pub struct ImageDownloader {
    client: reqwest::blocking::Client,
}

impl ImageDownloader {
    pub fn new() -> Result<Self, ImageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ImageError::Connection {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Downloads `source` over `destination`, returning the byte count.
    ///
    /// The destination is checked before any request is made.
    pub fn download(&self, source: &str, destination: &str) -> Result<usize, ImageError> {
        if !has_image_extension(destination) {
            return Err(ImageError::BadType(destination.to_string()));
        }
        if source.trim().is_empty() {
            return Err(ImageError::MissingSource);
        }

        let connection = |e: reqwest::Error| ImageError::Connection {
            url: source.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(source.trim()).send().map_err(connection)?;
        if !response.status().is_success() {
            return Err(ImageError::HttpStatus(response.status().as_u16()));
        }
        let bytes = response.bytes().map_err(connection)?;

        let path = Path::new(destination.trim());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &bytes)?;

        logging::debug(
            Source::Image,
            None,
            &format!("Saved {} bytes from {} to {}", bytes.len(), source, path.display()),
        );
        Ok(bytes.len())
    }
}
