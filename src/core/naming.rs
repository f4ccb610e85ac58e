use crate::core::models::{ArtifactKind, Mode, NamingTier};

pub const DIGEST_LENGTH: usize = 8;

/// First eight hex characters of the blake3 hash of `bytes`
pub fn content_digest(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex.as_str()[..DIGEST_LENGTH].to_string()
}

/// Expand `[name]`, `[ext]`, `[contenthash]` and `[contenthash:N]`
pub fn expand_template(template: &str, name: &str, digest: &str, ext: &str) -> String {
    let mut out = String::with_capacity(template.len() + name.len() + digest.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let Some(close) = after.find(']') else {
            out.push_str(after);
            return out;
        };

        let token = &after[1..close];
        match token.split_once(':') {
            None if token == "name" => out.push_str(name),
            None if token == "ext" => out.push_str(ext),
            None if token == "contenthash" => out.push_str(digest),
            Some(("contenthash", length)) => {
                let length = length.parse::<usize>().unwrap_or(digest.len());
                out.push_str(&digest[..length.min(digest.len())]);
            }
            _ => out.push_str(&after[..=close]),
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// A requested chunk name made safe to use in a file name. Path separators
/// fold into `_`; empty, `.` and `..` segments are dropped. None when nothing
/// usable remains.
pub fn sanitize_chunk_name(name: &str) -> Option<String> {
    let segments: Vec<String> = name
        .split(|c: char| c == '/' || c == '\\')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(|s| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
                .collect()
        })
        .collect();
    let joined = segments.join("_");
    let name = joined.trim_start_matches('.');
    (!name.is_empty()).then(|| name.to_string())
}

/// Filename template for an artifact, by mode and naming tier
pub fn filename_template(kind: ArtifactKind, tier: NamingTier, mode: Mode) -> &'static str {
    match (kind, mode) {
        (ArtifactKind::Asset, _) => "assets/[contenthash:8][ext]",
        (ArtifactKind::Script, Mode::Development) => "[name].js",
        (ArtifactKind::Style, Mode::Development) => "[name].css",
        (ArtifactKind::Style, Mode::Production) => "[name].[contenthash:8].css",
        (ArtifactKind::Script, Mode::Production) => match tier {
            NamingTier::Named => "[name].[contenthash:8].js",
            NamingTier::Generic => "vendors/[name].js",
        },
    }
}

pub fn artifact_filename(
    kind: ArtifactKind,
    tier: NamingTier,
    mode: Mode,
    name: &str,
    digest: &str,
    ext: &str,
) -> String {
    expand_template(filename_template(kind, tier, mode), name, digest, ext)
}
