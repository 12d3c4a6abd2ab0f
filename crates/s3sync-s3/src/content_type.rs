const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Best-effort `Content-Type` for an object key, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    let name = key.rsplit('/').next().unwrap_or(key);
    let Some((_, ext)) = name.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };

    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "text/xml; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "avif" => "image/avif",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(content_type_for("site/index.HTML"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("img/logo.png"), "image/png");
        assert_eq!(content_type_for("a.tar.gz"), "application/gzip");
    }

    #[test]
    fn test_unknown_or_missing_extension() {
        assert_eq!(content_type_for("data.unknownext"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for("Makefile"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for("dir.d/README"), DEFAULT_CONTENT_TYPE);
    }
}
