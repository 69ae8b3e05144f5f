//! Allowed upload types
//!
//! The declared type comes from the extension. When the content itself is
//! recognisable, its sniffed type must be allowed too, so a renamed
//! executable does not get in as `report.pdf`.

/// Extensions accepted for upload and the MIME type served for each
pub const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("zip", "application/zip"),
    ("rar", "application/vnd.rar"),
    ("7z", "application/x-7z-compressed"),
];

/// Sniffed types that are containers of allowed formats
///
/// OOXML files sniff as zip and legacy Office files as OLE storage.
const CONTAINER_TYPES: &[&str] = &["application/x-ole-storage", "application/x-rar-compressed"];

/// Bytes kept from the start of an upload for sniffing
pub const SNIFF_LEN: usize = 8192;

/// Fallback served for files whose extension is not on the list
pub const OCTET_STREAM: &str = "application/octet-stream";

/// MIME type for an allowed extension (case-insensitive)
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// MIME type for a stored filename, octet-stream when unknown
pub fn mime_for_name(name: &str) -> &'static str {
    match crate::sanitize::split_extension(name) {
        (_, Some(ext)) => mime_for_extension(ext).unwrap_or(OCTET_STREAM),
        (_, None) => OCTET_STREAM,
    }
}

fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_TYPES.iter().any(|(_, m)| *m == mime) || CONTAINER_TYPES.contains(&mime)
}

/// What sniffing the first bytes of an upload found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    pub mime: &'static str,
    pub extension: &'static str,
}

/// Identify content from its leading bytes; `None` for text and unknown formats
pub fn sniff(head: &[u8]) -> Option<Sniffed> {
    infer::get(head).map(|kind| Sniffed {
        mime: kind.mime_type(),
        extension: kind.extension(),
    })
}

/// Decide the MIME type for an upload, or explain why it is refused
///
/// `ext` is the extension of the cleaned filename; when missing, the
/// sniffed type's own extension is used instead.
pub fn check_upload(ext: Option<&str>, sniffed: Option<&Sniffed>) -> Result<&'static str, String> {
    let ext = match (ext, sniffed) {
        (Some(ext), _) => ext.to_string(),
        (None, Some(s)) => s.extension.to_string(),
        (None, None) => return Err("File type could not be determined".to_string()),
    };

    let declared = mime_for_extension(&ext)
        .ok_or_else(|| format!("File type .{} is not allowed", ext.to_ascii_lowercase()))?;

    if let Some(s) = sniffed {
        if !is_allowed_mime(s.mime) {
            return Err(format!(
                "File content ({}) is not an allowed type",
                s.mime
            ));
        }
    }

    Ok(declared)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const PDF_HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";

    #[test]
    fn test_extension_lookup_case_insensitive() {
        assert_eq!(mime_for_extension("PDF"), Some("application/pdf"));
        assert_eq!(mime_for_extension("Jpg"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("exe"), None);
        assert_eq!(mime_for_name("scan_1700000000000.png"), "image/png");
        assert_eq!(mime_for_name("mystery"), OCTET_STREAM);
    }

    #[test]
    fn test_sniffs_known_formats() {
        assert_eq!(sniff(PNG_HEADER).unwrap().mime, "image/png");
        assert_eq!(sniff(PDF_HEADER).unwrap().mime, "application/pdf");
        assert!(sniff(b"plain text, nothing to see").is_none());
    }

    #[test]
    fn test_check_upload_by_extension() {
        assert_eq!(check_upload(Some("csv"), None), Ok("text/csv"));
        assert!(check_upload(Some("exe"), None).is_err());
        assert!(check_upload(None, None).is_err());
    }

    #[test]
    fn test_check_upload_rejects_disguised_content() {
        let mut elf_header = vec![0u8; 64];
        elf_header[..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        let elf = sniff(&elf_header);
        assert!(elf.is_some());
        assert!(check_upload(Some("pdf"), elf.as_ref()).is_err());
    }

    #[test]
    fn test_check_upload_uses_sniffed_extension_when_missing() {
        let png = sniff(PNG_HEADER);
        assert_eq!(check_upload(None, png.as_ref()), Ok("image/png"));
    }
}
