//! Input validation
//!
//! Pure functions guarding everything that crosses the trust boundary: payload
//! size, image byte format, declared content types, upload filenames, and the
//! SSRF checks applied to caller-supplied URLs.
//!
//! The URL check runs on the raw, unresolved hostname string before any
//! network activity. It does not defend against DNS rebinding between the
//! check and the fetch; that residual risk is accepted and documented.

use std::net::Ipv4Addr;
use std::path::Path;

use image::ImageFormat;
use url::{Host, Url};

use crate::config::{ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES};
use crate::error::{OcrError, Result};

/// Rejects payloads beyond the configured byte limit.
pub fn validate_file_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(OcrError::TooLarge { size, limit });
    }
    Ok(())
}

/// Confirms the payload starts with the magic bytes of an allowed image
/// format and returns the canonical MIME type for it.
pub fn validate_image_format(bytes: &[u8]) -> Result<&'static str> {
    let format = image::guess_format(bytes)
        .map_err(|e| OcrError::InvalidImage(format!("unrecognized image data: {e}")))?;

    let mime = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::WebP => "image/webp",
        other => {
            return Err(OcrError::InvalidImage(format!(
                "unsupported image format {other:?}; allowed formats: JPEG, PNG, BMP, WEBP"
            )))
        }
    };
    debug_assert!(ALLOWED_MIME_TYPES.contains(&mime));
    Ok(mime)
}

/// Checks a declared Content-Type header (parameters ignored) against the
/// image allow-list.
pub fn validate_content_type(header: &str) -> Result<()> {
    let mime = header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(OcrError::InvalidImage(format!(
            "unsupported content type '{mime}'; allowed types: {}",
            ALLOWED_MIME_TYPES.join(", ")
        )));
    }
    Ok(())
}

/// Checks an upload filename's extension against the allow-list.
pub fn validate_filename(filename: &str) -> Result<()> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| {
            OcrError::InvalidImage(format!("filename '{filename}' has no extension"))
        })?;

    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(OcrError::InvalidImage(format!(
            "unsupported file extension '.{ext}'; allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    // mime_guess keeps the extension table honest: every allowed extension
    // must map back into the MIME allow-list.
    let mime = mime_guess::from_ext(&ext).first_or_octet_stream();
    validate_content_type(mime.essence_str())
}

/// SSRF guard for caller-supplied URLs.
///
/// Rejects non-http(s) schemes (and anything with "file" in the scheme),
/// missing hostnames, localhost/loopback, and literal IPv4 hosts inside
/// private, link-local, multicast, or reserved ranges.
pub fn validate_url_safety(raw: &str) -> Result<Url> {
    let url =
        Url::parse(raw).map_err(|e| OcrError::UnsafeUrl(format!("invalid URL: {e}")))?;

    let scheme = url.scheme().to_ascii_lowercase();
    if scheme.contains("file") {
        return Err(OcrError::UnsafeUrl("file URLs are not allowed".into()));
    }
    if scheme != "http" && scheme != "https" {
        return Err(OcrError::UnsafeUrl(format!(
            "scheme '{scheme}' is not allowed; only http and https"
        )));
    }

    match url.host() {
        None => Err(OcrError::UnsafeUrl("URL has no hostname".into())),
        Some(Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(OcrError::UnsafeUrl("access to localhost is not allowed".into()));
            }
            // Literal IPv4 addresses sometimes survive as domains (e.g. with
            // trailing dots stripped by the parser differently); re-check.
            if let Ok(addr) = domain.parse::<Ipv4Addr>() {
                check_ipv4(addr)?;
            }
            Ok(url)
        }
        Some(Host::Ipv4(addr)) => {
            check_ipv4(addr)?;
            Ok(url)
        }
        Some(Host::Ipv6(addr)) => {
            if addr.is_loopback() {
                return Err(OcrError::UnsafeUrl("access to loopback addresses is not allowed".into()));
            }
            Ok(url)
        }
    }
}

/// Rejects IPv4 addresses in ranges a fetch must never reach:
/// 127/8, 10/8, 172.16/12, 192.168/16, 169.254/16, 0/8, 224/4, 240/4.
fn check_ipv4(addr: Ipv4Addr) -> Result<()> {
    let [a, b, _, _] = addr.octets();
    let forbidden = addr.is_loopback()
        || addr.is_private()
        || addr.is_link_local()
        || addr.is_multicast()
        || a == 0
        || a >= 240
        || (a == 172 && (16..=31).contains(&b));

    if forbidden {
        return Err(OcrError::UnsafeUrl(format!(
            "access to address {addr} is not allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_size_within_limit_passes() {
        assert!(validate_file_size(1_000, 10_000).is_ok());
        assert!(validate_file_size(10_000, 10_000).is_ok());
    }

    #[test]
    fn file_size_over_limit_fails() {
        let err = validate_file_size(10_001, 10_000).unwrap_err();
        assert!(matches!(err, OcrError::TooLarge { size: 10_001, limit: 10_000 }));
    }

    #[test]
    fn png_magic_maps_to_png_mime() {
        let png_header = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(validate_image_format(&png_header).unwrap(), "image/png");
    }

    #[test]
    fn jpeg_magic_maps_to_jpeg_mime() {
        let jpeg_header = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0];
        assert_eq!(validate_image_format(&jpeg_header).unwrap(), "image/jpeg");
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = validate_image_format(b"definitely not an image").unwrap_err();
        assert!(matches!(err, OcrError::InvalidImage(_)));
    }

    #[test]
    fn disallowed_format_is_rejected() {
        // GIF decodes fine but is not in the allow-list.
        let gif_header = b"GIF89a\x01\x00\x01\x00";
        let err = validate_image_format(gif_header).unwrap_err();
        assert!(matches!(err, OcrError::InvalidImage(_)));
    }

    #[test]
    fn content_type_ignores_parameters() {
        assert!(validate_content_type("image/png; charset=binary").is_ok());
        assert!(validate_content_type("IMAGE/JPEG").is_ok());
    }

    #[test]
    fn content_type_outside_allow_list_fails() {
        assert!(validate_content_type("text/html").is_err());
        assert!(validate_content_type("application/pdf").is_err());
        assert!(validate_content_type("").is_err());
    }

    #[test]
    fn filename_extension_allow_list() {
        assert!(validate_filename("scan.png").is_ok());
        assert!(validate_filename("photo.JPEG").is_ok());
        assert!(validate_filename("doc.pdf").is_err());
        assert!(validate_filename("noextension").is_err());
    }

    #[test]
    fn public_urls_pass() {
        assert!(validate_url_safety("http://example.com/x.jpg").is_ok());
        assert!(validate_url_safety("https://example.com/x.jpg").is_ok());
        assert!(validate_url_safety("https://93.184.216.34/x.jpg").is_ok());
    }

    #[test]
    fn non_http_schemes_fail() {
        assert!(validate_url_safety("ftp://example.com/x.jpg").is_err());
        assert!(validate_url_safety("file:///etc/passwd").is_err());
        assert!(validate_url_safety("gopher://example.com/").is_err());
    }

    #[test]
    fn unparseable_urls_fail() {
        assert!(validate_url_safety("not-a-valid-url").is_err());
        assert!(validate_url_safety("").is_err());
    }

    #[test]
    fn localhost_and_loopback_fail() {
        assert!(validate_url_safety("http://localhost/image.jpg").is_err());
        assert!(validate_url_safety("http://LOCALHOST/image.jpg").is_err());
        assert!(validate_url_safety("http://127.0.0.1/image.jpg").is_err());
        assert!(validate_url_safety("http://127.8.8.8/image.jpg").is_err());
        assert!(validate_url_safety("http://[::1]/image.jpg").is_err());
    }

    #[test]
    fn private_and_reserved_ranges_fail() {
        for host in [
            "10.0.0.1",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "224.0.0.1",
            "240.0.0.1",
            "255.255.255.255",
        ] {
            let url = format!("http://{host}/image.jpg");
            assert!(validate_url_safety(&url).is_err(), "{host} should be rejected");
        }
    }

    #[test]
    fn adjacent_public_ranges_pass() {
        // Boundaries just outside the blocked ranges.
        for host in ["172.15.0.1", "172.32.0.1", "11.0.0.1", "192.169.0.1", "223.255.255.1"] {
            let url = format!("http://{host}/image.jpg");
            assert!(validate_url_safety(&url).is_ok(), "{host} should be allowed");
        }
    }
}
