//! Output format negotiation for image responses.
//!
//! `optimal_format_for_user_agent` is a substring heuristic on browser names
//! and is only approximate. Prefer `negotiate_format` whenever the client sent
//! an `Accept` header.

use crate::models::OutputFormat;

const CHROMIUM_MARKERS: [&str; 5] = ["Edg/", "Edge/", "OPR/", "Chromium/", "Chrome/"];
const FIREFOX_WEBP_SINCE: u32 = 65;
const SAFARI_WEBP_SINCE: u32 = 14;
const SAFARI_AVIF_SINCE: u32 = 16;

pub fn optimal_format_for_user_agent(user_agent: &str) -> OutputFormat {
    if CHROMIUM_MARKERS.iter().any(|m| user_agent.contains(m)) {
        return OutputFormat::Webp;
    }

    if let Some(version) = major_version(user_agent, "Firefox/") {
        return if version >= FIREFOX_WEBP_SINCE {
            OutputFormat::Webp
        } else {
            OutputFormat::Jpeg
        };
    }

    if user_agent.contains("Safari/") {
        return match major_version(user_agent, "Version/") {
            Some(v) if v >= SAFARI_AVIF_SINCE => OutputFormat::Avif,
            Some(v) if v >= SAFARI_WEBP_SINCE => OutputFormat::Webp,
            _ => OutputFormat::Jpeg,
        };
    }

    OutputFormat::Jpeg
}

/// Picks the best format the client lists in its `Accept` header.
///
/// AVIF beats WebP beats JPEG. Media ranges with `q=0` are refused.
pub fn negotiate_format(accept: &str) -> OutputFormat {
    let accepted: Vec<&str> = accept
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';').map(str::trim);
            let media_type = parts.next().filter(|t| !t.is_empty())?;
            let refused = parts.any(|param| {
                param
                    .strip_prefix("q=")
                    .and_then(|q| q.parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });
            (!refused).then_some(media_type)
        })
        .collect();

    let accepts = |mime: &str| accepted.iter().any(|t| t.eq_ignore_ascii_case(mime));

    if accepts(OutputFormat::Avif.mime_type()) {
        OutputFormat::Avif
    } else if accepts(OutputFormat::Webp.mime_type()) {
        OutputFormat::Webp
    } else {
        OutputFormat::Jpeg
    }
}

/// Accept-header negotiation when a header is present, the user-agent
/// heuristic otherwise.
pub fn select_format(accept: Option<&str>, user_agent: Option<&str>) -> OutputFormat {
    match (accept, user_agent) {
        (Some(accept), _) if !accept.trim().is_empty() => negotiate_format(accept),
        (_, Some(user_agent)) => optimal_format_for_user_agent(user_agent),
        _ => OutputFormat::Jpeg,
    }
}

fn major_version(user_agent: &str, marker: &str) -> Option<u32> {
    let start = user_agent.find(marker)? + marker.len();
    let digits: String = user_agent[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
