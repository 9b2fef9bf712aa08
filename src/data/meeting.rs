//! Meeting tab detection and title cleanup
//!
//! Classifies a tab URL as a video meeting on one of the supported
//! platforms, and turns a raw tab title into something fit for a
//! recording name.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Video meeting platforms we recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Platform {
    GoogleMeet,
    Zoom,
    Teams,
    Webex,
    Whereby,
    Jitsi,
}

impl Platform {
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::GoogleMeet => "Google Meet",
            Platform::Zoom => "Zoom",
            Platform::Teams => "Microsoft Teams",
            Platform::Webex => "Webex",
            Platform::Whereby => "Whereby",
            Platform::Jitsi => "Jitsi Meet",
        }
    }

    /// Title suffixes/prefixes the platform adds to the tab title
    fn title_decorations(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            Platform::GoogleMeet => (&["Meet - ", "Meet – "], &[" - Google Meet"]),
            Platform::Zoom => (&[], &[" - Zoom", " | Zoom"]),
            Platform::Teams => (&[], &[" | Microsoft Teams", " - Microsoft Teams"]),
            Platform::Webex => (&[], &[" - Webex", " | Webex"]),
            Platform::Whereby => (&[], &[" - Whereby", " | Whereby"]),
            Platform::Jitsi => (&[], &[" | Jitsi Meet", " - Jitsi Meet"]),
        }
    }
}

/// Provenance of the tab being recorded, as reported by an observer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabContext {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// A tab recognized as a meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingInfo {
    pub platform: Platform,
    /// Room code or meeting number, when the URL carries one
    pub meeting_id: Option<String>,
}

/// Platform hosting `url`, regardless of whether it is a meeting room
pub fn platform_for_url(url: &str) -> Option<Platform> {
    let parsed = Url::parse(url).ok()?;
    platform_for_host(parsed.host_str()?)
}

fn platform_for_host(host: &str) -> Option<Platform> {
    let host = host.to_ascii_lowercase();
    let matches = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));

    if host == "meet.google.com" {
        Some(Platform::GoogleMeet)
    } else if matches("zoom.us") || matches("zoom.com") {
        Some(Platform::Zoom)
    } else if matches("teams.microsoft.com") || matches("teams.live.com") {
        Some(Platform::Teams)
    } else if matches("webex.com") {
        Some(Platform::Webex)
    } else if matches("whereby.com") {
        Some(Platform::Whereby)
    } else if host == "meet.jit.si" || host.starts_with("jitsi.") {
        Some(Platform::Jitsi)
    } else {
        None
    }
}

/// Decide whether `url` is an active meeting room
pub fn detect_meeting(url: &str) -> Option<MeetingInfo> {
    let parsed = Url::parse(url).ok()?;
    let platform = platform_for_host(parsed.host_str()?)?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let meeting_id = match platform {
        Platform::GoogleMeet => {
            let code = segments.first().copied()?;
            if !is_meet_code(code) {
                return None;
            }
            Some(code.to_string())
        }
        Platform::Zoom => match segments.as_slice() {
            ["wc", "join", id, ..] => Some((*id).to_string()),
            ["wc", id, ..] | ["j", id, ..] | ["s", id, ..] => Some((*id).to_string()),
            _ => return None,
        },
        Platform::Teams => {
            let fragment = parsed.fragment().unwrap_or_default();
            let in_call = segments.iter().any(|s| *s == "meetup-join" || *s == "meet")
                || fragment.contains("calling")
                || fragment.contains("pre-join");
            if !in_call {
                return None;
            }
            segments.last().filter(|s| **s != "meetup-join").map(|s| s.to_string())
        }
        Platform::Webex => {
            let in_meeting = segments.iter().any(|s| *s == "meet" || *s == "wbxmjs" || *s == "j.php");
            if !in_meeting {
                return None;
            }
            segments.last().map(|s| s.to_string())
        }
        Platform::Whereby | Platform::Jitsi => {
            let room = segments.first().copied()?;
            Some(room.to_string())
        }
    };

    Some(MeetingInfo {
        platform,
        meeting_id,
    })
}

/// Google Meet room codes look like `abc-defg-hij`
fn is_meet_code(code: &str) -> bool {
    let parts: Vec<&str> = code.split('-').collect();
    parts.len() == 3
        && [3, 4, 3]
            .iter()
            .zip(&parts)
            .all(|(len, part)| part.len() == *len && part.chars().all(|c| c.is_ascii_lowercase()))
}

/// Turn a raw tab title into a recording name
///
/// Unknown platforms get the generic cleanup only. An empty result falls
/// back to the platform name, or to a timestamped name.
pub fn clean_title(platform: Option<Platform>, raw: &str, now: DateTime<Utc>) -> String {
    let mut title = collapse_whitespace(strip_unread_count(raw.trim()));

    if let Some(platform) = platform {
        let (prefixes, suffixes) = platform.title_decorations();
        for prefix in prefixes {
            if let Some(rest) = title.strip_prefix(prefix) {
                title = rest.trim().to_string();
            } else if title == prefix.trim_end() {
                title.clear();
            }
        }
        for suffix in suffixes {
            if let Some(rest) = title.strip_suffix(suffix) {
                title = rest.trim().to_string();
            }
        }
        if title.is_empty() || title == platform.display_name() || title == "Meet" {
            return format!("{} meeting {}", platform.display_name(), now.format("%Y-%m-%d %H:%M"));
        }
        return title;
    }

    if title.is_empty() {
        return format!("Recording {}", now.format("%Y-%m-%d %H:%M"));
    }
    title
}

/// Drop a leading unread counter such as `(3) `
fn strip_unread_count(title: &str) -> &str {
    if let Some(rest) = title.strip_prefix('(') {
        if let Some(close) = rest.find(')') {
            let (count, after) = rest.split_at(close);
            if !count.is_empty() && count.chars().all(|c| c.is_ascii_digit() || c == '+') {
                return after[1..].trim_start();
            }
        }
    }
    title
}

fn collapse_whitespace(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_detect_google_meet_room() {
        let info = detect_meeting("https://meet.google.com/abc-defg-hij?authuser=0").unwrap();
        assert_eq!(info.platform, Platform::GoogleMeet);
        assert_eq!(info.meeting_id.as_deref(), Some("abc-defg-hij"));

        assert!(detect_meeting("https://meet.google.com/landing").is_none());
        assert!(detect_meeting("https://meet.google.com/").is_none());
    }

    #[test]
    fn test_detect_zoom_web_client() {
        let info = detect_meeting("https://us02web.zoom.us/wc/81234567890/join").unwrap();
        assert_eq!(info.platform, Platform::Zoom);
        assert_eq!(info.meeting_id.as_deref(), Some("81234567890"));

        let info = detect_meeting("https://zoom.us/j/123456789?pwd=x").unwrap();
        assert_eq!(info.meeting_id.as_deref(), Some("123456789"));

        assert!(detect_meeting("https://zoom.us/pricing").is_none());
    }

    #[test]
    fn test_detect_teams_and_others() {
        assert_eq!(
            detect_meeting("https://teams.microsoft.com/l/meetup-join/19%3ameeting")
                .unwrap()
                .platform,
            Platform::Teams
        );
        assert!(detect_meeting("https://teams.microsoft.com/_#/conversations").is_none());
        assert_eq!(
            detect_meeting("https://whereby.com/design-review").unwrap().meeting_id.as_deref(),
            Some("design-review")
        );
        assert_eq!(
            detect_meeting("https://meet.jit.si/StandupRoom").unwrap().platform,
            Platform::Jitsi
        );
        assert!(detect_meeting("https://example.com/meet").is_none());
        assert!(detect_meeting("not a url").is_none());
    }

    #[test]
    fn test_clean_title_per_platform() {
        assert_eq!(
            clean_title(Some(Platform::GoogleMeet), "Meet - Design review", now()),
            "Design review"
        );
        assert_eq!(
            clean_title(Some(Platform::Teams), "(2) Sprint planning | Microsoft Teams", now()),
            "Sprint planning"
        );
        assert_eq!(
            clean_title(Some(Platform::Zoom), "Zoom", now()),
            "Zoom meeting 2026-03-14 09:30"
        );
        assert_eq!(
            clean_title(Some(Platform::GoogleMeet), "Meet - ", now()),
            "Google Meet meeting 2026-03-14 09:30"
        );
    }

    #[test]
    fn test_clean_title_generic_fallback() {
        assert_eq!(
            clean_title(None, "  (12)   Customer   call  ", now()),
            "Customer call"
        );
        assert_eq!(clean_title(None, "(draft) notes", now()), "(draft) notes");
        assert_eq!(clean_title(None, "   ", now()), "Recording 2026-03-14 09:30");
    }

    #[test]
    fn test_platform_for_url() {
        assert_eq!(
            platform_for_url("https://acme.webex.com/meet/jdoe"),
            Some(Platform::Webex)
        );
        assert_eq!(platform_for_url("https://example.org"), None);
    }
}
