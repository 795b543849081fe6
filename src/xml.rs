//! Wire codec for the speaker's XML vocabulary.
//!
//! Encoders build the exact request bodies the firmware expects: single-line,
//! no inter-tag whitespace, all free text entity-escaped. Decoders walk the
//! response tree matching element names only, since namespace prefixes vary
//! between firmware builds, and tolerate fields that move between attribute
//! and child-element encodings. Pure transformations, no I/O.

use std::net::IpAddr;
use std::str::FromStr;

use xmltree::{Element, XMLNode};

use crate::error::{Result, SoundTouchError};
use crate::events::SpeakerEvent;
use crate::types::{
    AudioDspControls, BassCapabilities, BassLevel, Capability, ComponentInfo, ContentItem,
    ControlLevel, DeviceIdentity, Key, KeyState, NowPlaying, PlayStatus, Preset,
    SourceDescriptor, SourceStatus, SpeakerLevels, ToneControls, VolumeState, WifiSecurity,
    WirelessNetwork, ZoneConfiguration, ZoneMember,
};

/// Escape XML special characters
fn esc(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Body for one phase of a key press
pub fn encode_key(key: Key, state: KeyState, sender: &str) -> String {
    format!(
        r#"<key state="{}" sender="{}">{}</key>"#,
        state.as_str(),
        esc(sender),
        key.as_str()
    )
}

/// Body for a volume set; the mute flag travels as an attribute when present
pub fn encode_volume(level: u8, mute: Option<bool>) -> String {
    match mute {
        Some(mute) => format!(r#"<volume muteenabled="{mute}">{level}</volume>"#),
        None => format!("<volume>{level}</volume>"),
    }
}

/// Body for a bass set
pub fn encode_bass(level: i32) -> String {
    format!("<bass>{level}</bass>")
}

/// Body for content selection
///
/// Absent fields are omitted entirely; the item name rides as a child
/// element. The firmware is intolerant of whitespace between tags.
pub fn encode_content_item(item: &ContentItem) -> String {
    let mut body = String::from("<ContentItem");
    body.push_str(&format!(r#" source="{}""#, esc(&item.source)));
    if let Some(account) = &item.source_account {
        body.push_str(&format!(r#" sourceAccount="{}""#, esc(account)));
    }
    if let Some(location) = &item.location {
        body.push_str(&format!(r#" location="{}""#, esc(location)));
    }
    if item.is_presetable {
        body.push_str(r#" isPresetable="true""#);
    }
    body.push('>');
    if let Some(name) = &item.item_name {
        body.push_str(&format!("<itemName>{}</itemName>", esc(name)));
    }
    body.push_str("</ContentItem>");
    body
}

fn encode_member(ip: Option<IpAddr>, device_id: &str) -> String {
    match ip {
        Some(ip) => format!(r#"<member ipaddress="{}">{}</member>"#, ip, esc(device_id)),
        None => format!("<member>{}</member>", esc(device_id)),
    }
}

/// Body for a full zone description; an empty member list encodes teardown
pub fn encode_set_zone(master_id: &str, sender_ip: IpAddr, members: &[ZoneMember]) -> String {
    let mut body = format!(
        r#"<zone master="{}" senderIPAddress="{}">"#,
        esc(master_id),
        sender_ip
    );
    for member in members {
        body.push_str(&encode_member(Some(member.ip), &member.device_id));
    }
    body.push_str("</zone>");
    body
}

/// Body for adding one slave to an existing zone
pub fn encode_add_zone_slave(master_id: &str, member_ip: IpAddr, member_id: &str) -> String {
    format!(
        r#"<zone master="{}">{}</zone>"#,
        esc(master_id),
        encode_member(Some(member_ip), member_id)
    )
}

/// Body for removing one slave; the remove call carries no member address
pub fn encode_remove_zone_slave(master_id: &str, member_id: &str) -> String {
    format!(
        r#"<zone master="{}">{}</zone>"#,
        esc(master_id),
        encode_member(None, member_id)
    )
}

/// Body for a device rename
pub fn encode_name(name: &str) -> String {
    format!("<name>{}</name>", esc(name))
}

/// Body for a setup-state change
pub fn encode_setup_state(state: &str, timeout_ms: Option<u32>) -> String {
    match timeout_ms {
        Some(timeout) => format!(r#"<setupState state="{}" timeout="{timeout}"/>"#, esc(state)),
        None => format!(r#"<setupState state="{}"/>"#, esc(state)),
    }
}

/// Body for wireless provisioning; the timeout is expected pre-clamped
pub fn encode_wireless_profile(
    ssid: &str,
    password: &str,
    security: WifiSecurity,
    timeout_secs: u32,
) -> String {
    format!(
        r#"<AddWirelessProfile timeout="{timeout_secs}"><profile ssid="{}" password="{}" securityType="{}"/></AddWirelessProfile>"#,
        esc(ssid),
        esc(password),
        security.as_str()
    )
}

/// Body for a tone controls set; only the levels being changed are posted
pub fn encode_tone_controls(bass: Option<i32>, treble: Option<i32>) -> String {
    let mut body = String::from("<audioproducttonecontrols>");
    if let Some(bass) = bass {
        body.push_str(&format!(r#"<bass value="{bass}"/>"#));
    }
    if let Some(treble) = treble {
        body.push_str(&format!(r#"<treble value="{treble}"/>"#));
    }
    body.push_str("</audioproducttonecontrols>");
    body
}

/// Body for a speaker levels set
pub fn encode_speaker_levels(front: Option<i32>, rear: Option<i32>) -> String {
    let mut body = String::from("<audioproductlevelcontrols>");
    if let Some(front) = front {
        body.push_str(&format!(r#"<frontCenterSpeakerLevel value="{front}"/>"#));
    }
    if let Some(rear) = rear {
        body.push_str(&format!(r#"<rearSurroundSpeakersLevel value="{rear}"/>"#));
    }
    body.push_str("</audioproductlevelcontrols>");
    body
}

/// Body for an audio DSP set
pub fn encode_audio_dsp(audio_mode: Option<&str>, video_sync_audio_delay: Option<i32>) -> String {
    let mut body = String::from("<audiodspcontrols");
    if let Some(mode) = audio_mode {
        body.push_str(&format!(r#" audiomode="{}""#, esc(mode)));
    }
    if let Some(delay) = video_sync_audio_delay {
        body.push_str(&format!(r#" videosyncaudiodelay="{delay}""#));
    }
    body.push_str("/>");
    body
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

fn parse_root(body: &str) -> Result<Element> {
    Element::parse(body.as_bytes())
        .map_err(|e| SoundTouchError::protocol(format!("invalid XML: {e}"), body))
}

fn child_elements<'a>(el: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    el.children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(move |c| c.name == name)
}

fn own_text(el: &Element) -> Option<String> {
    let text = el.get_text()?;
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn child_text(el: &Element, name: &str) -> Option<String> {
    own_text(el.get_child(name)?)
}

fn attr<'a>(el: &'a Element, name: &str) -> Option<&'a str> {
    el.attributes.get(name).map(String::as_str)
}

/// Attribute-or-child lookup for fields the firmware moves around
fn attr_or_child(el: &Element, name: &str) -> Option<String> {
    attr(el, name)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .or_else(|| child_text(el, name))
}

fn parse_int<T: FromStr>(raw: &str, what: &str, body: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| SoundTouchError::protocol(format!("non-numeric {what}: {raw:?}"), body))
}

fn int_field<T: FromStr + Default>(el: &Element, name: &str, body: &str) -> Result<T> {
    match attr_or_child(el, name) {
        Some(raw) => parse_int(&raw, name, body),
        None => Ok(T::default()),
    }
}

fn bool_field(el: &Element, name: &str) -> bool {
    attr_or_child(el, name)
        .map(|raw| raw.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn descendants<'a>(el: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in el.children.iter().filter_map(XMLNode::as_element) {
        if child.name == name {
            out.push(child);
        }
        descendants(child, name, out);
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode the info endpoint into an identity for the probed address
pub fn parse_device_info(body: &str, ip: IpAddr, port: u16) -> Result<DeviceIdentity> {
    let root = parse_root(body)?;

    let device_id = attr(&root, "deviceID")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SoundTouchError::protocol("missing deviceID attribute", body))?
        .to_string();

    let name = child_text(&root, "name").unwrap_or_default();
    let model = child_text(&root, "type").unwrap_or_default();
    let cloud_account = child_text(&root, "margeAccountUUID");

    let mac_address = root
        .get_child("networkInfo")
        .and_then(|net| child_text(net, "macAddress"))
        .unwrap_or_else(|| device_id.clone());

    let mut components = Vec::new();
    if let Some(list) = root.get_child("components") {
        for component in child_elements(list, "component") {
            let Some(category) = child_text(component, "componentCategory") else {
                continue;
            };
            components.push(ComponentInfo {
                category,
                software_version: child_text(component, "softwareVersion"),
                serial_number: child_text(component, "serialNumber"),
            });
        }
    }

    Ok(DeviceIdentity {
        ip,
        port,
        device_id,
        name,
        model,
        mac_address,
        cloud_account,
        components,
        capabilities: None,
    })
}

fn volume_from(el: &Element, body: &str) -> Result<VolumeState> {
    Ok(VolumeState {
        target: int_field(el, "targetvolume", body)?,
        actual: int_field(el, "actualvolume", body)?,
        muted: bool_field(el, "muteenabled"),
    })
}

/// Decode the volume endpoint
pub fn parse_volume(body: &str) -> Result<VolumeState> {
    let root = parse_root(body)?;
    volume_from(&root, body)
}

fn bass_from(el: &Element, body: &str) -> Result<BassLevel> {
    Ok(BassLevel {
        target: int_field(el, "targetbass", body)?,
        actual: int_field(el, "actualbass", body)?,
    })
}

/// Decode the bass endpoint
pub fn parse_bass(body: &str) -> Result<BassLevel> {
    let root = parse_root(body)?;
    bass_from(&root, body)
}

/// Decode the bass capabilities endpoint
pub fn parse_bass_capabilities(body: &str) -> Result<BassCapabilities> {
    let root = parse_root(body)?;
    Ok(BassCapabilities {
        available: bool_field(&root, "bassAvailable"),
        min: int_field(&root, "bassMin", body)?,
        max: int_field(&root, "bassMax", body)?,
        default: int_field(&root, "bassDefault", body)?,
    })
}

fn now_playing_from(el: &Element, body: &str) -> Result<NowPlaying> {
    let play_status = attr_or_child(el, "playStatus").unwrap_or_default();

    let mut position = 0;
    let mut duration = 0;
    if let Some(time) = el.get_child("time") {
        if let Some(total) = attr(time, "total") {
            duration = parse_int(total, "time total", body)?;
        }
        if let Some(text) = own_text(time) {
            position = parse_int(&text, "time position", body)?;
        }
    }

    Ok(NowPlaying {
        source: attr_or_child(el, "source").unwrap_or_default(),
        source_account: attr(el, "sourceAccount")
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        play_status: PlayStatus::from_wire(&play_status),
        track: child_text(el, "track"),
        artist: child_text(el, "artist"),
        album: child_text(el, "album"),
        genre: child_text(el, "genre"),
        station_name: child_text(el, "stationName").or_else(|| child_text(el, "station")),
        art_url: child_text(el, "art"),
        position,
        duration,
    })
}

/// Decode the now-playing endpoint
pub fn parse_now_playing(body: &str) -> Result<NowPlaying> {
    let root = parse_root(body)?;
    now_playing_from(&root, body)
}

/// Decode the sources endpoint
pub fn parse_sources(body: &str) -> Result<Vec<SourceDescriptor>> {
    let root = parse_root(body)?;
    let mut sources = Vec::new();
    for item in child_elements(&root, "sourceItem") {
        let Some(source) = attr(item, "source").filter(|s| !s.is_empty()) else {
            continue;
        };
        sources.push(SourceDescriptor {
            source: source.to_string(),
            account: attr(item, "sourceAccount").unwrap_or_default().to_string(),
            status: SourceStatus::from_wire(attr(item, "status").unwrap_or_default()),
            name: own_text(item).unwrap_or_default(),
        });
    }
    Ok(sources)
}

fn content_item_from(el: &Element) -> Option<ContentItem> {
    let source = attr(el, "source").filter(|s| !s.is_empty())?;
    Some(ContentItem {
        source: source.to_string(),
        source_account: attr(el, "sourceAccount").map(str::to_string),
        location: attr(el, "location").map(str::to_string),
        is_presetable: attr(el, "isPresetable")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false),
        item_name: child_text(el, "itemName"),
    })
}

fn presets_from(el: &Element) -> Vec<Preset> {
    let mut presets = Vec::new();
    for preset in child_elements(el, "preset") {
        let Some(id) = attr(preset, "id").and_then(|id| id.trim().parse().ok()) else {
            continue;
        };
        let Some(item) = preset.get_child("ContentItem").and_then(content_item_from) else {
            continue;
        };
        presets.push(Preset { id, item });
    }
    presets
}

/// Decode the presets endpoint; malformed slots are skipped
pub fn parse_presets(body: &str) -> Result<Vec<Preset>> {
    let root = parse_root(body)?;
    Ok(presets_from(&root))
}

/// Decode the capabilities endpoint
pub fn parse_capabilities(body: &str) -> Result<Vec<Capability>> {
    let root = parse_root(body)?;
    let mut capabilities = Vec::new();
    for cap in child_elements(&root, "capability") {
        let Some(name) = attr(cap, "name").filter(|s| !s.is_empty()) else {
            continue;
        };
        capabilities.push(Capability {
            name: name.to_string(),
            url: attr(cap, "url").filter(|s| !s.is_empty()).map(str::to_string),
            info: attr(cap, "info").filter(|s| !s.is_empty()).map(str::to_string),
        });
    }
    Ok(capabilities)
}

/// Decode the audio DSP endpoint
pub fn parse_audio_dsp(body: &str) -> Result<AudioDspControls> {
    let root = parse_root(body)?;
    Ok(AudioDspControls {
        audio_mode: attr_or_child(&root, "audiomode").unwrap_or_default(),
        video_sync_audio_delay: int_field(&root, "videosyncaudiodelay", body)?,
        supported_audio_modes: attr_or_child(&root, "supportedaudiomodes")
            .unwrap_or_default()
            .split('|')
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

fn control_level_from(el: Option<&Element>, body: &str) -> Result<ControlLevel> {
    let Some(el) = el else {
        return Ok(ControlLevel {
            value: 0,
            min: 0,
            max: 0,
            step: 1,
        });
    };
    Ok(ControlLevel {
        value: int_field(el, "value", body)?,
        min: int_field(el, "minValue", body)?,
        max: int_field(el, "maxValue", body)?,
        step: match attr_or_child(el, "step") {
            Some(raw) => parse_int(&raw, "step", body)?,
            None => 1,
        },
    })
}

/// Decode the tone controls endpoint
pub fn parse_tone_controls(body: &str) -> Result<ToneControls> {
    let root = parse_root(body)?;
    Ok(ToneControls {
        bass: control_level_from(root.get_child("bass"), body)?,
        treble: control_level_from(root.get_child("treble"), body)?,
    })
}

/// Decode the speaker levels endpoint
pub fn parse_speaker_levels(body: &str) -> Result<SpeakerLevels> {
    let root = parse_root(body)?;
    Ok(SpeakerLevels {
        front_center: control_level_from(root.get_child("frontCenterSpeakerLevel"), body)?,
        rear_surround: control_level_from(root.get_child("rearSurroundSpeakersLevel"), body)?,
    })
}

fn zone_from(el: &Element, body: &str) -> Result<Option<ZoneConfiguration>> {
    let master_id = attr_or_child(el, "master").unwrap_or_default();

    let mut members = Vec::new();
    for member in child_elements(el, "member") {
        let Some(device_id) = own_text(member) else {
            continue;
        };
        let Some(ip) = attr(member, "ipaddress").and_then(|ip| ip.parse().ok()) else {
            continue;
        };
        let is_master = device_id == master_id;
        members.push(ZoneMember {
            ip,
            device_id,
            is_master,
        });
    }

    if master_id.is_empty() {
        if members.is_empty() {
            return Ok(None);
        }
        return Err(SoundTouchError::protocol("zone members without a master", body));
    }

    Ok(Some(ZoneConfiguration { master_id, members }))
}

/// Decode the zone query endpoint; an empty element means "no zone"
pub fn parse_zone(body: &str) -> Result<Option<ZoneConfiguration>> {
    let root = parse_root(body)?;
    zone_from(&root, body)
}

/// Decode the active wireless profile endpoint
pub fn parse_wireless_profile(body: &str) -> Result<Option<String>> {
    let root = parse_root(body)?;
    Ok(attr_or_child(&root, "ssid"))
}

/// Decode the wireless site survey endpoint
pub fn parse_site_survey(body: &str) -> Result<Vec<WirelessNetwork>> {
    let root = parse_root(body)?;
    let mut rows = Vec::new();
    descendants(&root, "wirelessNetwork", &mut rows);

    let mut networks = Vec::new();
    for row in rows {
        let Some(ssid) = attr_or_child(row, "ssid") else {
            continue;
        };
        networks.push(WirelessNetwork {
            ssid,
            signal_strength: attr_or_child(row, "signalStrength"),
            security: attr_or_child(row, "securityType"),
        });
    }
    Ok(networks)
}

// ---------------------------------------------------------------------------
// Event frames
// ---------------------------------------------------------------------------

/// Nested-or-flat payload lookup: `<volumeUpdated><volume>..</volume></volumeUpdated>`
/// and `<volumeUpdated>..</volumeUpdated>` both occur in the wild
fn payload<'a>(el: &'a Element, inner: &str) -> &'a Element {
    el.get_child(inner).unwrap_or(el)
}

fn event_from(el: &Element, body: &str) -> Result<Option<SpeakerEvent>> {
    let event = match el.name.as_str() {
        "nowPlayingUpdated" => {
            SpeakerEvent::NowPlaying(now_playing_from(payload(el, "nowPlaying"), body)?)
        }
        "volumeUpdated" => SpeakerEvent::Volume(volume_from(payload(el, "volume"), body)?),
        "bassUpdated" => SpeakerEvent::Bass(bass_from(payload(el, "bass"), body)?),
        "zoneUpdated" => SpeakerEvent::Zone(zone_from(payload(el, "zone"), body)?),
        "presetsUpdated" => SpeakerEvent::Presets(presets_from(payload(el, "presets"))),
        "connectionStateUpdated" => SpeakerEvent::ConnectionState {
            state: attr(el, "state").unwrap_or_default().to_string(),
            up: attr(el, "up")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            signal: attr(el, "signal").filter(|s| !s.is_empty()).map(str::to_string),
        },
        "connectionStatusChanged" => SpeakerEvent::ConnectionStatus(
            attr_or_child(el, "connectionStatus").unwrap_or_default(),
        ),
        "userActivityUpdate" => SpeakerEvent::UserActivity,
        "SoundTouchSdkInfo" => SpeakerEvent::SdkInfo {
            server_version: attr(el, "serverVersion").unwrap_or_default().to_string(),
            server_build: attr(el, "serverBuild").unwrap_or_default().to_string(),
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Decode one event-channel frame into zero or more events
///
/// A frame is either a single event element or an `updates` wrapper holding
/// several; wrapped events are returned in wire order. Unknown event types
/// decode to nothing rather than an error.
pub fn parse_event_frame(body: &str) -> Result<Vec<SpeakerEvent>> {
    let root = parse_root(body)?;

    if root.name == "updates" {
        let mut events = Vec::new();
        for child in root.children.iter().filter_map(XMLNode::as_element) {
            if let Some(event) = event_from(child, body)? {
                events.push(event);
            }
        }
        return Ok(events);
    }

    Ok(event_from(&root, body)?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_body_is_exact() {
        assert_eq!(
            encode_key(Key::Power, KeyState::Press, "Gabbo"),
            r#"<key state="press" sender="Gabbo">POWER</key>"#
        );
        assert_eq!(
            encode_key(Key::NextTrack, KeyState::Release, "Gabbo"),
            r#"<key state="release" sender="Gabbo">NEXT_TRACK</key>"#
        );
    }

    #[test]
    fn volume_body_with_and_without_mute() {
        assert_eq!(encode_volume(30, None), "<volume>30</volume>");
        assert_eq!(
            encode_volume(30, Some(true)),
            r#"<volume muteenabled="true">30</volume>"#
        );
    }

    #[test]
    fn content_item_escapes_and_round_trips() {
        let item = ContentItem::stream("http://host/a?b=1&c=2", "Jazz <&> \"Blues\"");
        let body = encode_content_item(&item);

        assert!(!body.contains("> <"), "no inter-tag whitespace: {body}");
        assert!(body.contains("b=1&amp;c=2"));
        assert!(body.contains("Jazz &lt;&amp;&gt;"));

        let decoded = content_item_from(&parse_root(&body).unwrap()).unwrap();
        assert_eq!(decoded.item_name.as_deref(), Some("Jazz <&> \"Blues\""));
        assert_eq!(decoded, item);
    }

    #[test]
    fn plain_source_switch_keeps_empty_account() {
        let item = ContentItem::for_source("AUX", "");
        assert_eq!(
            encode_content_item(&item),
            r#"<ContentItem source="AUX" sourceAccount=""></ContentItem>"#
        );
    }

    #[test]
    fn zone_bodies_are_single_line() {
        let members = vec![
            ZoneMember {
                ip: "192.168.1.11".parse().unwrap(),
                device_id: "BBBB".to_string(),
                is_master: false,
            },
            ZoneMember {
                ip: "192.168.1.12".parse().unwrap(),
                device_id: "CCCC".to_string(),
                is_master: false,
            },
        ];
        assert_eq!(
            encode_set_zone("AAAA", "192.168.1.10".parse().unwrap(), &members),
            r#"<zone master="AAAA" senderIPAddress="192.168.1.10"><member ipaddress="192.168.1.11">BBBB</member><member ipaddress="192.168.1.12">CCCC</member></zone>"#
        );
        assert_eq!(
            encode_set_zone("AAAA", "192.168.1.10".parse().unwrap(), &[]),
            r#"<zone master="AAAA" senderIPAddress="192.168.1.10"></zone>"#
        );
        assert_eq!(
            encode_add_zone_slave("AAAA", "192.168.1.13".parse().unwrap(), "DDDD"),
            r#"<zone master="AAAA"><member ipaddress="192.168.1.13">DDDD</member></zone>"#
        );
        assert_eq!(
            encode_remove_zone_slave("AAAA", "DDDD"),
            r#"<zone master="AAAA"><member>DDDD</member></zone>"#
        );
    }

    #[test]
    fn wireless_profile_body_escapes_credentials() {
        let body = encode_wireless_profile("Cafe \"Zur Post\"", "p&ss<word", WifiSecurity::WpaOrWpa2, 30);
        assert_eq!(
            body,
            r#"<AddWirelessProfile timeout="30"><profile ssid="Cafe &quot;Zur Post&quot;" password="p&amp;ss&lt;word" securityType="wpa_or_wpa2"/></AddWirelessProfile>"#
        );
    }

    #[test]
    fn info_parses_with_namespace_prefix() {
        let body = r#"<?xml version="1.0" encoding="UTF-8" ?>
<ns:info xmlns:ns="http://www.bose.com/soundtouch" deviceID="689E19653E96">
  <ns:name>Kitchen</ns:name>
  <ns:type>SoundTouch 20</ns:type>
  <ns:margeAccountUUID>7532556</ns:margeAccountUUID>
  <ns:components>
    <ns:component>
      <ns:componentCategory>SCM</ns:componentCategory>
      <ns:softwareVersion>27.0.6</ns:softwareVersion>
      <ns:serialNumber>F8000682</ns:serialNumber>
    </ns:component>
    <ns:component>
      <ns:componentCategory>PackagedProduct</ns:componentCategory>
    </ns:component>
  </ns:components>
  <ns:networkInfo type="SCM">
    <ns:macAddress>689E19653E96</ns:macAddress>
    <ns:ipAddress>192.168.1.20</ns:ipAddress>
  </ns:networkInfo>
</ns:info>"#;

        let identity = parse_device_info(body, "192.168.1.20".parse().unwrap(), 8090).unwrap();
        assert_eq!(identity.device_id, "689E19653E96");
        assert_eq!(identity.name, "Kitchen");
        assert_eq!(identity.model, "SoundTouch 20");
        assert_eq!(identity.mac_address, "689E19653E96");
        assert_eq!(identity.cloud_account.as_deref(), Some("7532556"));
        assert_eq!(identity.components.len(), 2);
        assert_eq!(identity.components[0].software_version.as_deref(), Some("27.0.6"));
        assert!(identity.is_soundtouch());
    }

    #[test]
    fn info_without_device_id_is_a_protocol_error() {
        let err = parse_device_info("<info><name>X</name></info>", "10.0.0.1".parse().unwrap(), 8090)
            .unwrap_err();
        match err {
            SoundTouchError::ProtocolError { body, .. } => assert!(body.contains("<name>X</name>")),
            other => panic!("expected ProtocolError, got {other:?}"),
        }
    }

    #[test]
    fn volume_parses_child_elements() {
        let body = r#"<volume deviceID="689E19653E96"><targetvolume>26</targetvolume><actualvolume>25</actualvolume><muteenabled>false</muteenabled></volume>"#;
        let volume = parse_volume(body).unwrap();
        assert_eq!(volume.target, 26);
        assert_eq!(volume.actual, 25);
        assert!(!volume.muted);
    }

    #[test]
    fn garbage_volume_keeps_raw_payload() {
        let err = parse_volume("<volume><actualvolume>loud</actualvolume></volume>").unwrap_err();
        match err {
            SoundTouchError::ProtocolError { body, .. } => assert!(body.contains("loud")),
            other => panic!("expected ProtocolError, got {other:?}"),
        }
    }

    #[test]
    fn play_status_attribute_and_child_are_equivalent() {
        let as_attr = r#"<nowPlaying source="TUNEIN" playStatus="PLAY_STATE"><track>Song</track></nowPlaying>"#;
        let as_child = r#"<nowPlaying source="TUNEIN"><playStatus>PLAY_STATE</playStatus><track>Song</track></nowPlaying>"#;

        let a = parse_now_playing(as_attr).unwrap();
        let b = parse_now_playing(as_child).unwrap();
        assert_eq!(a.play_status, PlayStatus::Play);
        assert_eq!(a.play_status, b.play_status);
        assert_eq!(a.track.as_deref(), Some("Song"));
    }

    #[test]
    fn now_playing_reads_time_and_art() {
        let body = r#"<nowPlaying source="INTERNET_RADIO" sourceAccount="">
  <stationName>Radio Swiss Jazz</stationName>
  <playStatus>BUFFERING_STATE</playStatus>
  <art artImageStatus="IMAGE_PRESENT">http://img/station.png</art>
  <time total="265">15</time>
</nowPlaying>"#;
        let np = parse_now_playing(body).unwrap();
        assert_eq!(np.station_name.as_deref(), Some("Radio Swiss Jazz"));
        assert_eq!(np.art_url.as_deref(), Some("http://img/station.png"));
        assert_eq!(np.duration, 265);
        assert_eq!(np.position, 15);
        assert!(np.is_playing());
        assert_eq!(np.source_account, None);
    }

    #[test]
    fn sources_rows_parse() {
        let body = r#"<sources deviceID="689E19653E96">
  <sourceItem source="BLUETOOTH" sourceAccount="" status="UNAVAILABLE" isLocal="true">Bluetooth</sourceItem>
  <sourceItem source="SPOTIFY" sourceAccount="user1" status="READY">user1</sourceItem>
</sources>"#;
        let sources = parse_sources(body).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].status, SourceStatus::Unavailable);
        assert_eq!(sources[1].account, "user1");
        assert!(sources[1].is_ready());
        assert_eq!(sources[0].name, "Bluetooth");
    }

    #[test]
    fn presets_parse_nested_content_items() {
        let body = r#"<presets>
  <preset id="1" createdOn="1476019956">
    <ContentItem source="INTERNET_RADIO" location="4712" sourceAccount="" isPresetable="true">
      <itemName>Radio Swiss Jazz</itemName>
    </ContentItem>
  </preset>
  <preset id="oops"><ContentItem source="X"/></preset>
</presets>"#;
        let presets = parse_presets(body).unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].id, 1);
        assert_eq!(presets[0].item.item_name.as_deref(), Some("Radio Swiss Jazz"));
        assert!(presets[0].item.is_presetable);
    }

    #[test]
    fn bass_capabilities_parse() {
        let body = r#"<bassCapabilities deviceID="689E19653E96"><bassAvailable>true</bassAvailable><bassMin>-9</bassMin><bassMax>0</bassMax><bassDefault>0</bassDefault></bassCapabilities>"#;
        let caps = parse_bass_capabilities(body).unwrap();
        assert!(caps.available);
        assert_eq!(caps.min, -9);
        assert!(caps.contains(-5));
        assert!(!caps.contains(1));
    }

    #[test]
    fn audio_dsp_splits_supported_modes() {
        let body = r#"<audiodspcontrols audiomode="AUDIO_MODE_NORMAL" videosyncaudiodelay="0" supportedaudiomodes="AUDIO_MODE_NORMAL|AUDIO_MODE_DIALOG"/>"#;
        let dsp = parse_audio_dsp(body).unwrap();
        assert_eq!(dsp.audio_mode, "AUDIO_MODE_NORMAL");
        assert_eq!(dsp.supported_audio_modes.len(), 2);
        assert!(dsp.supports_mode("AUDIO_MODE_DIALOG"));
        assert!(!dsp.supports_mode("AUDIO_MODE_NIGHT"));
    }

    #[test]
    fn tone_controls_read_attribute_ranges() {
        let body = r#"<audioproducttonecontrols><bass value="-2" minValue="-9" maxValue="9" step="1"/><treble value="3" minValue="-9" maxValue="9" step="1"/></audioproducttonecontrols>"#;
        let tone = parse_tone_controls(body).unwrap();
        assert_eq!(tone.bass.value, -2);
        assert_eq!(tone.treble.max, 9);
        assert!(tone.bass.in_range(-9));
        assert!(!tone.bass.in_range(-10));
    }

    #[test]
    fn zone_parses_master_and_members() {
        let body = r#"<zone master="AAAA" senderIPAddress="192.168.1.10">
  <member ipaddress="192.168.1.10">AAAA</member>
  <member ipaddress="192.168.1.11">BBBB</member>
</zone>"#;
        let zone = parse_zone(body).unwrap().unwrap();
        assert_eq!(zone.master_id, "AAAA");
        assert_eq!(zone.members.len(), 2);
        assert!(zone.members[0].is_master);
        assert!(!zone.members[1].is_master);
    }

    #[test]
    fn zone_master_as_child_element() {
        let body = r#"<zone><master>AAAA</master><member ipaddress="192.168.1.11">BBBB</member></zone>"#;
        let zone = parse_zone(body).unwrap().unwrap();
        assert_eq!(zone.master_id, "AAAA");
        assert_eq!(zone.members.len(), 1);
    }

    #[test]
    fn empty_zone_means_no_zone() {
        assert_eq!(parse_zone("<zone/>").unwrap(), None);
        assert_eq!(parse_zone(r#"<zone master=""></zone>"#).unwrap(), None);
    }

    #[test]
    fn site_survey_reads_attr_and_child_encodings() {
        let body = r#"<performWirelessSiteSurveyResponse>
  <items>
    <wirelessNetwork ssid="HomeNet" signalStrength="-41" securityType="WPA2"/>
    <wirelessNetwork><ssid>CafeNet</ssid><signalStrength>-77</signalStrength></wirelessNetwork>
    <wirelessNetwork signalStrength="-90"/>
  </items>
</performWirelessSiteSurveyResponse>"#;
        let networks = parse_site_survey(body).unwrap();
        assert_eq!(networks.len(), 2);
        assert_eq!(networks[0].ssid, "HomeNet");
        assert_eq!(networks[1].ssid, "CafeNet");
        assert_eq!(networks[1].signal_strength.as_deref(), Some("-77"));
    }

    #[test]
    fn wireless_profile_ssid_attr_or_child() {
        assert_eq!(
            parse_wireless_profile(r#"<activeProfile ssid="HomeNet"/>"#).unwrap(),
            Some("HomeNet".to_string())
        );
        assert_eq!(
            parse_wireless_profile(r#"<activeProfile><ssid>HomeNet</ssid></activeProfile>"#).unwrap(),
            Some("HomeNet".to_string())
        );
        assert_eq!(parse_wireless_profile("<activeProfile/>").unwrap(), None);
    }

    #[test]
    fn updates_frame_fans_out_in_wire_order() {
        let body = r#"<updates deviceID="689E19653E96">
  <volumeUpdated><volume><targetvolume>40</targetvolume><actualvolume>38</actualvolume><muteenabled>false</muteenabled></volume></volumeUpdated>
  <userActivityUpdate/>
  <somethingNew/>
</updates>"#;
        let events = parse_event_frame(body).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            SpeakerEvent::Volume(v) => assert_eq!(v.target, 40),
            other => panic!("expected volume first, got {other:?}"),
        }
        assert!(matches!(events[1], SpeakerEvent::UserActivity));
    }

    #[test]
    fn flat_and_nested_event_payloads_match() {
        let nested = r#"<volumeUpdated><volume><actualvolume>12</actualvolume></volume></volumeUpdated>"#;
        let flat = r#"<volumeUpdated><actualvolume>12</actualvolume></volumeUpdated>"#;
        let a = parse_event_frame(nested).unwrap();
        let b = parse_event_frame(flat).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sdk_info_frame_parses() {
        let events = parse_event_frame(r#"<SoundTouchSdkInfo serverVersion="4" serverBuild="trunk r42017"/>"#).unwrap();
        match &events[0] {
            SpeakerEvent::SdkInfo { server_version, server_build } => {
                assert_eq!(server_version, "4");
                assert_eq!(server_build, "trunk r42017");
            }
            other => panic!("expected SdkInfo, got {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_is_an_error_unknown_type_is_not() {
        assert!(parse_event_frame("not xml at all").is_err());
        assert_eq!(parse_event_frame("<somethingNew/>").unwrap(), Vec::new());
    }
}
