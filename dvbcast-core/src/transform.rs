//! Request transformation: a declarative remap of incoming stream requests,
//! plus the advertised-family masquerade (e.g. an IPTV source presented as a
//! DVB-C tuner).

use log::info;
use serde::{Deserialize, Serialize};

use crate::device::FeId;
use crate::request::query_value;
use crate::tuning::DeliverySystem;

/// One remap rule: matches on the request frequency (the client-visible
/// stream identifier) plus optional system and method, and substitutes the
/// whole query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRule {
    /// Request frequency to match, in kHz.
    pub freq_khz: u32,
    /// Optional `msys=` token the request must carry ("dvbs2", "dvbc", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msys: Option<String>,
    /// Optional method the rule is limited to (PLAY/SETUP/OPTIONS).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Replacement query. Inherits the original `pids=` fragment when it
    /// does not carry one of its own.
    pub to: String,
}

/// Persisted transformation table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Family to advertise instead of the physical one ("dvbs2" or "dvbc").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_as: Option<String>,
    #[serde(default)]
    pub rules: Vec<TransformRule>,
}

/// Per-frontend transform state. `reset` clears only the runtime flag; the
/// rule table survives a teardown.
#[derive(Debug, Default)]
pub struct Transform {
    settings: TransformSettings,
    /// Set when the last parsed request was rewritten.
    transformed: bool,
}

fn request_freq_khz(msg: &str) -> Option<u32> {
    let value = query_value(msg, "freq")?;
    let mhz: f64 = value.parse().ok()?;
    Some((mhz * 1000.0) as u32)
}

impl Transform {
    pub fn new(settings: TransformSettings) -> Self {
        Transform {
            settings,
            transformed: false,
        }
    }

    fn find_rule(&self, msg: &str, method: &str) -> Option<&TransformRule> {
        if !self.settings.enabled {
            return None;
        }
        let freq_khz = request_freq_khz(msg)?;
        let msys = query_value(msg, "msys").unwrap_or("");
        self.settings.rules.iter().find(|rule| {
            rule.freq_khz == freq_khz
                && rule
                    .msys
                    .as_deref()
                    .map_or(true, |m| m.eq_ignore_ascii_case(msys))
                && rule
                    .method
                    .as_deref()
                    .map_or(true, |m| m.eq_ignore_ascii_case(method))
        })
    }

    /// Rewrite a stream request through the rule table; returns the message
    /// unchanged when no rule matches.
    pub fn transform_stream_string(&mut self, id: FeId, msg: &str, method: &str) -> String {
        let Some(rule) = self.find_rule(msg, method) else {
            return msg.to_string();
        };
        let mut out = rule.to.clone();
        if query_value(&out, "pids").is_none() {
            if let Some(pids) = query_value(msg, "pids") {
                out.push_str("&pids=");
                out.push_str(pids);
            }
        }
        info!("Frontend: {id}, Transformed request to: {out}");
        self.transformed = true;
        out
    }

    /// The delivery system a request would use after transformation; lets the
    /// controller answer capability questions for remapped requests.
    pub fn transformation_system_for(&self, msg: &str, method: &str) -> Option<DeliverySystem> {
        let rule = self.find_rule(msg, method)?;
        DeliverySystem::from_msys(query_value(&rule.to, "msys")?)
    }

    pub fn was_transformed(&self) -> bool {
        self.transformed
    }

    /// Clear the runtime flag; called from teardown.
    pub fn reset(&mut self) {
        self.transformed = false;
    }

    pub fn advertise_as_dvbs2(&self) -> bool {
        matches!(self.settings.advertise_as.as_deref(), Some("dvbs2"))
    }

    pub fn advertise_as_dvbc(&self) -> bool {
        matches!(self.settings.advertise_as.as_deref(), Some("dvbc"))
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    pub fn apply_settings(&mut self, settings: TransformSettings) {
        self.settings = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iptv_remap() -> Transform {
        Transform::new(TransformSettings {
            enabled: true,
            advertise_as: Some("dvbc".to_string()),
            rules: vec![TransformRule {
                freq_khz: 346_000,
                msys: Some("dvbc".to_string()),
                method: None,
                to: "freq=11836&msys=dvbs2&pol=h&sr=27500&mtype=8psk&fec=23".to_string(),
            }],
        })
    }

    #[test]
    fn matching_request_is_rewritten_and_keeps_pids() {
        let mut transform = iptv_remap();
        let out = transform.transform_stream_string(
            FeId(0),
            "freq=346&msys=dvbc&sr=6900&pids=0,16",
            "PLAY",
        );
        assert!(out.starts_with("freq=11836&msys=dvbs2"));
        assert!(out.ends_with("&pids=0,16"));
        assert!(transform.was_transformed());

        transform.reset();
        assert!(!transform.was_transformed());
    }

    #[test]
    fn non_matching_request_passes_through() {
        let mut transform = iptv_remap();
        let msg = "freq=11538&msys=dvbs2&pids=0";
        assert_eq!(
            transform.transform_stream_string(FeId(0), msg, "PLAY"),
            msg
        );
        assert!(!transform.was_transformed());
    }

    #[test]
    fn disabled_table_never_matches() {
        let mut settings = iptv_remap().settings.clone();
        settings.enabled = false;
        let mut transform = Transform::new(settings);
        let msg = "freq=346&msys=dvbc&pids=0";
        assert_eq!(
            transform.transform_stream_string(FeId(0), msg, "PLAY"),
            msg
        );
    }

    #[test]
    fn transformation_system_reports_the_target_family() {
        let transform = iptv_remap();
        assert_eq!(
            transform.transformation_system_for("freq=346&msys=dvbc", "PLAY"),
            Some(DeliverySystem::DvbS2)
        );
        assert_eq!(
            transform.transformation_system_for("freq=500&msys=dvbc", "PLAY"),
            None
        );
    }

    #[test]
    fn advertised_family_flags() {
        let transform = iptv_remap();
        assert!(transform.advertise_as_dvbc());
        assert!(!transform.advertise_as_dvbs2());
    }
}
