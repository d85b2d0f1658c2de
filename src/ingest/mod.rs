/// Network ingestion: forecast documents and satellite images.
///
/// Submodules:
/// - `darksky` - forecast API client, the `WeatherSource` seam and the
///   retry-with-backoff loop.
/// - `image`   - satellite/radar image downloader.

pub mod darksky;
pub mod image;
