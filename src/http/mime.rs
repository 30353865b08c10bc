//! Content kinds and their MIME strings.

/// MIME category attached to a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentKind {
    #[default]
    Text,
    Html,
    Css,
    JavaScript,
    Icon,
    Gif,
    Jpeg,
    Png,
    Svg,
    Tiff,
    Csv,
    Json,
    MsWord,
    MsWordOpenXml,
}

impl ContentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentKind::Text => "text/plain",
            ContentKind::Html => "text/html",
            ContentKind::Css => "text/css",
            ContentKind::JavaScript => "text/javascript",
            ContentKind::Icon => "image/vnd.microsoft.icon",
            ContentKind::Gif => "image/gif",
            ContentKind::Jpeg => "image/jpeg",
            ContentKind::Png => "image/png",
            ContentKind::Svg => "image/svg+xml",
            ContentKind::Tiff => "image/tiff",
            ContentKind::Csv => "text/csv",
            ContentKind::Json => "application/json",
            ContentKind::MsWord => "application/msword",
            ContentKind::MsWordOpenXml => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    /// Resolves a file extension (with leading dot, case-insensitive).
    /// Unknown extensions fall back to [`ContentKind::Text`].
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            ".htm" | ".html" => ContentKind::Html,
            ".css" => ContentKind::Css,
            ".js" | ".mjs" => ContentKind::JavaScript,
            ".ico" => ContentKind::Icon,
            ".gif" => ContentKind::Gif,
            ".jpeg" | ".jpg" => ContentKind::Jpeg,
            ".png" => ContentKind::Png,
            ".svg" => ContentKind::Svg,
            ".tif" | ".tiff" => ContentKind::Tiff,
            ".csv" => ContentKind::Csv,
            ".json" => ContentKind::Json,
            ".doc" => ContentKind::MsWord,
            ".docx" => ContentKind::MsWordOpenXml,
            _ => ContentKind::Text,
        }
    }
}
