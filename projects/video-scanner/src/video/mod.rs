pub mod processor;

/// File name suffixes treated as videos. Matching is case-sensitive.
pub const VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".avi", ".mov"];

pub fn is_video_name(name: &str) -> bool {
    VIDEO_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
