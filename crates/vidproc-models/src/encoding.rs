//! Output encoding constants.

/// Height of the transcoded output in pixels.
pub const TARGET_HEIGHT: u32 = 360;

/// Prefix prepended to the raw filename to name the processed output.
pub const PROCESSED_PREFIX: &str = "processed-";

/// Scale filter for a fixed output height.
///
/// Width `-2` keeps the aspect ratio and rounds to an even number, which
/// yuv420p encoders require.
pub fn scale_filter(height: u32) -> String {
    format!("scale=-2:{}", height)
}

/// Content type for a video object, guessed from its extension.
pub fn video_content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
