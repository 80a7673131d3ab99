//! Firmware version extraction from image file names
//!
//! Release images carry their version in the file name as a `_vXpYpZ_`
//! token, e.g. `P5612_v1p12p1292_pt516_x16.bin` is version `1.12.1292`.

/// Extract the dotted version string from an image file name, if present
pub fn fw_version_from_filename(name: &str) -> Option<String> {
    let mut search = name;
    while let Some(at) = search.find("_v") {
        let tail = &search[at + 2..];
        if let Some(version) = parse_version_token(tail) {
            return Some(version);
        }
        search = &search[at + 2..];
    }
    None
}

fn parse_version_token(tail: &str) -> Option<String> {
    let token = tail.split('_').next()?;
    let mut parts = token.split('p');
    let major = parts.next().filter(|s| all_digits(s))?;
    let minor = parts.next().filter(|s| all_digits(s))?;
    let build = parts.next().filter(|s| all_digits(s))?;
    if parts.next().is_some() {
        return None;
    }
    Some(format!("{}.{}.{}", major, minor, build))
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
