//! Transcode target selection.
//!
//! Picks the output video codec and encoder (CPU or hardware) for a client by
//! scoring every candidate the client accepts. Higher is better:
//!
//! | codec | base | hardware | CPU  |
//! |-------|------|----------|------|
//! | av1   | 60   | +30      | -20  |
//! | hevc  | 50   | +30      | -10  |
//! | h264  | 40   | +30      | +15  |
//!
//! A profile preference adds 20 to its codec and 10 to any hardware
//! candidate when it prefers hardware.

use serde::Serialize;

/// How the stream is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecPath {
    #[serde(rename = "direct")]
    DirectPlay,
    Remux,
    TranscodeCpu,
    TranscodeHw,
    Reject,
}

/// Why the path was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecReason {
    DirectPlaySupported,
    RemuxRequired,
    ProfilePreference,
    HwCodecUnavailable,
    ProfileConstraint,
    #[serde(rename = "cost_cpu_preferred")]
    CpuPreferred,
    CodecSelected,
    NoCompatibleCodec,
}

/// Hardware encoders of this server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCapabilities {
    pub hw_accel_available: bool,
    pub hw_codecs: Vec<String>,
}

impl ServerCapabilities {
    fn has_hw(&self, codec: &str) -> bool {
        self.hw_accel_available && self.hw_codecs.iter().any(|c| canonical_codec(c) == codec)
    }
}

/// Inputs of one selection.
#[derive(Debug, Clone, Default)]
pub struct CodecInput {
    pub source_codec: String,
    pub source_container: String,
    pub client_codecs: Vec<String>,
    pub client_containers: Vec<String>,
    pub profile: String,
    pub requested_codec: String,
    pub require_hw: bool,
    pub server: ServerCapabilities,
}

/// Result of one selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecChoice {
    pub path: CodecPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    pub use_hw: bool,
    pub reason: CodecReason,
}

impl CodecChoice {
    fn reject(reason: CodecReason) -> Self {
        Self {
            path: CodecPath::Reject,
            codec: None,
            use_hw: false,
            reason,
        }
    }

    fn hw(codec: String, reason: CodecReason) -> Self {
        Self {
            path: CodecPath::TranscodeHw,
            codec: Some(codec),
            use_hw: true,
            reason,
        }
    }
}

#[derive(Debug, Default)]
struct ProfileRule {
    preferred: Option<String>,
    hard: Option<String>,
    prefer_hw: bool,
    require_hw: bool,
}

fn rule_for_profile(profile: &str, requested: &str) -> ProfileRule {
    let codec = |c: &str| Some(c.to_string());
    match profile {
        "av1_hw" => ProfileRule {
            preferred: codec("av1"),
            prefer_hw: true,
            ..Default::default()
        },
        "av1_required" => ProfileRule {
            preferred: codec("av1"),
            require_hw: true,
            ..Default::default()
        },
        "safari_hevc" => ProfileRule {
            hard: codec("hevc"),
            ..Default::default()
        },
        "safari_hevc_hw" | "safari_hevc_hw_ll" => ProfileRule {
            preferred: codec("hevc"),
            prefer_hw: true,
            ..Default::default()
        },
        "safari" => ProfileRule {
            preferred: codec("h264"),
            ..Default::default()
        },
        _ if !requested.is_empty() => ProfileRule {
            preferred: codec(requested),
            ..Default::default()
        },
        _ => ProfileRule::default(),
    }
}

/// Map encoder names and aliases to `h264`, `hevc` or `av1`.
pub fn canonical_codec(raw: &str) -> String {
    let v = raw.trim().to_ascii_lowercase();
    match v.as_str() {
        "h264" | "avc" | "avc1" | "libx264" | "h264_vaapi" => "h264".to_string(),
        "hevc" | "h265" | "h.265" | "libx265" | "hevc_vaapi" => "hevc".to_string(),
        "av1" | "av01" | "av1_vaapi" | "libsvtav1" | "libaom-av1" => "av1".to_string(),
        _ => v,
    }
}

fn canonical_codecs(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for c in values.iter().map(|v| canonical_codec(v)) {
        if !c.is_empty() && !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

fn codec_rank(codec: &str) -> u8 {
    match codec {
        "av1" => 3,
        "hevc" => 2,
        "h264" => 1,
        _ => 0,
    }
}

fn score(codec: &str, hw: bool, rule: &ProfileRule) -> i32 {
    let mut score = match codec {
        "av1" => 60,
        "hevc" => 50,
        "h264" => 40,
        _ => 0,
    };
    score += match (hw, codec) {
        (true, _) => 30,
        (false, "h264") => 15,
        (false, "hevc") => -10,
        (false, "av1") => -20,
        (false, _) => 0,
    };
    if rule.preferred.as_deref() == Some(codec) {
        score += 20;
    }
    if rule.prefer_hw && hw {
        score += 10;
    }
    score
}

fn best_candidate(codecs: &[String], server: &ServerCapabilities, rule: &ProfileRule) -> Option<CodecChoice> {
    let mut candidates: Vec<(String, bool, i32)> = Vec::new();
    for codec in codecs {
        candidates.push((codec.clone(), false, score(codec, false, rule)));
        if server.has_hw(codec) {
            candidates.push((codec.clone(), true, score(codec, true, rule)));
        }
    }

    candidates.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| b.1.cmp(&a.1))
            .then_with(|| codec_rank(&b.0).cmp(&codec_rank(&a.0)))
    });

    candidates.into_iter().next().map(|(codec, hw, _)| CodecChoice {
        path: if hw { CodecPath::TranscodeHw } else { CodecPath::TranscodeCpu },
        codec: Some(codec),
        use_hw: hw,
        reason: CodecReason::CodecSelected,
    })
}

/// Select the output codec for `input`. Pure and deterministic.
pub fn select_codec(input: &CodecInput) -> CodecChoice {
    let source = canonical_codec(&input.source_codec);
    let container = input.source_container.trim().to_ascii_lowercase();
    let client_codecs = canonical_codecs(&input.client_codecs);
    let client_containers: Vec<String> = input
        .client_containers
        .iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    if !source.is_empty() && client_codecs.contains(&source) {
        if !container.is_empty() && client_containers.contains(&container) {
            return CodecChoice {
                path: CodecPath::DirectPlay,
                codec: Some(source),
                use_hw: false,
                reason: CodecReason::DirectPlaySupported,
            };
        }
        return CodecChoice {
            path: CodecPath::Remux,
            codec: Some(source),
            use_hw: false,
            reason: CodecReason::RemuxRequired,
        };
    }

    let profile = input.profile.trim().to_ascii_lowercase();
    let requested = canonical_codec(&input.requested_codec);
    let rule = rule_for_profile(&profile, &requested);

    if rule.require_hw {
        let required = rule.preferred.clone().unwrap_or_else(|| requested.clone());
        if required.is_empty() || !input.server.has_hw(&required) {
            return CodecChoice::reject(CodecReason::HwCodecUnavailable);
        }
        return CodecChoice::hw(required, CodecReason::ProfileConstraint);
    }

    if input.require_hw {
        let required = if requested.is_empty() {
            rule.preferred.clone().unwrap_or_default()
        } else {
            requested.clone()
        };
        if !required.is_empty() {
            if !input.server.has_hw(&required) {
                return CodecChoice::reject(CodecReason::HwCodecUnavailable);
            }
            return CodecChoice::hw(required, CodecReason::ProfileConstraint);
        }
    }

    let allowed = if client_codecs.is_empty() {
        vec!["h264".to_string(), "hevc".to_string(), "av1".to_string()]
    } else {
        client_codecs
    };

    if let Some(hard) = &rule.hard {
        if !allowed.contains(hard) {
            return CodecChoice::reject(CodecReason::NoCompatibleCodec);
        }
        return match best_candidate(std::slice::from_ref(hard), &input.server, &rule) {
            Some(mut choice) => {
                choice.reason = CodecReason::ProfileConstraint;
                choice
            }
            None => CodecChoice::reject(CodecReason::NoCompatibleCodec),
        };
    }

    let Some(mut choice) = best_candidate(&allowed, &input.server, &rule) else {
        return CodecChoice::reject(CodecReason::NoCompatibleCodec);
    };

    if let Some(preferred) = &rule.preferred {
        if choice.codec.as_deref() != Some(preferred.as_str()) || (rule.prefer_hw && !choice.use_hw) {
            choice.reason = CodecReason::ProfilePreference;
            return choice;
        }
    }

    if !choice.use_hw && choice.codec.as_deref() == Some("h264") {
        choice.reason = CodecReason::CpuPreferred;
    }
    choice
}
