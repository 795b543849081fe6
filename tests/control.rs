//! Control API tests against a mock speaker
//!
//! Every test stands up a local HTTP server playing the device, so paths
//! and request bodies are checked exactly as the firmware would see them.

use bose_soundtouch::{Key, SoundTouchClient, SoundTouchError};
use mockito::Server;
use rstest::rstest;

fn client_for(server: &Server) -> SoundTouchClient {
    SoundTouchClient::with_port("127.0.0.1".parse().unwrap(), server.socket_address().port())
}

const INFO_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<info deviceID="9884E3A1B2C3">
  <name>Kitchen</name>
  <type>SoundTouch 20</type>
  <margeAccountUUID>5290163</margeAccountUUID>
  <components>
    <component>
      <componentCategory>SCM</componentCategory>
      <softwareVersion>27.0.6.46330</softwareVersion>
      <serialNumber>P72817342033007</serialNumber>
    </component>
    <component>
      <componentCategory>PackagedProduct</componentCategory>
      <serialNumber>069428P819501</serialNumber>
    </component>
  </components>
  <networkInfo type="SCM">
    <macAddress>9884E3A1B2C3</macAddress>
    <ipAddress>192.168.1.131</ipAddress>
  </networkInfo>
</info>"#;

const VOLUME_BODY: &str = concat!(
    r#"<volume deviceID="9884E3A1B2C3">"#,
    "<targetvolume>42</targetvolume>",
    "<actualvolume>42</actualvolume>",
    "<muteenabled>false</muteenabled>",
    "</volume>",
);

const BASS_CAPS_BODY: &str = concat!(
    r#"<bassCapabilities deviceID="9884E3A1B2C3">"#,
    "<bassAvailable>true</bassAvailable>",
    "<bassMin>-9</bassMin>",
    "<bassMax>0</bassMax>",
    "<bassDefault>0</bassDefault>",
    "</bassCapabilities>",
);

const OK_BODY: &str = "<status>ok</status>";

/// The info endpoint fills the identity, stamped with the probed address
#[tokio::test]
async fn info_parses_the_device_identity() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/info")
        .with_status(200)
        .with_body(INFO_BODY)
        .create_async()
        .await;

    let client = client_for(&server);
    let info = client.info().await.expect("info should parse");

    assert_eq!(info.device_id, "9884E3A1B2C3");
    assert_eq!(info.name, "Kitchen");
    assert_eq!(info.model, "SoundTouch 20");
    assert_eq!(info.mac_address, "9884E3A1B2C3");
    assert_eq!(info.cloud_account.as_deref(), Some("5290163"));
    assert_eq!(info.components.len(), 2);
    assert_eq!(info.ip, client.ip());
    assert_eq!(info.port, server.socket_address().port());
    assert!(info.is_soundtouch());
    mock.assert_async().await;
}

/// Volume sets travel as a bare level with the XML content type
#[tokio::test]
async fn set_volume_posts_the_exact_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/volume")
        .match_header("content-type", "application/xml")
        .match_body("<volume>35</volume>")
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    client_for(&server).set_volume(35).await.expect("set_volume should succeed");
    mock.assert_async().await;
}

/// A key press is a press body followed by a release body
#[tokio::test]
async fn press_key_sends_press_then_release() {
    let mut server = Server::new_async().await;
    let press = server
        .mock("POST", "/key")
        .match_body(r#"<key state="press" sender="Gabbo">PLAY</key>"#)
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;
    let release = server
        .mock("POST", "/key")
        .match_body(r#"<key state="release" sender="Gabbo">PLAY</key>"#)
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    client_for(&server).press_key(Key::Play).await.expect("press_key should succeed");
    press.assert_async().await;
    release.assert_async().await;
}

/// The release goes out even when the press fails, and the press error wins
#[tokio::test]
async fn the_release_is_still_sent_when_the_press_fails() {
    let mut server = Server::new_async().await;
    let press = server
        .mock("POST", "/key")
        .match_body(r#"<key state="press" sender="Gabbo">POWER</key>"#)
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;
    let release = server
        .mock("POST", "/key")
        .match_body(r#"<key state="release" sender="Gabbo">POWER</key>"#)
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    let err = client_for(&server).press_key(Key::Power).await.unwrap_err();
    assert!(matches!(err, SoundTouchError::DeviceRejected { status: 500, .. }));
    press.assert_async().await;
    release.assert_async().await;
}

/// Muting a speaker that is already muted never posts
#[tokio::test]
async fn muting_skips_the_post_when_already_muted() {
    let mut server = Server::new_async().await;
    let muted_body = VOLUME_BODY.replace(
        "<muteenabled>false</muteenabled>",
        "<muteenabled>true</muteenabled>",
    );
    server
        .mock("GET", "/volume")
        .with_status(200)
        .with_body(muted_body)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/volume")
        .with_status(200)
        .with_body(OK_BODY)
        .expect(0)
        .create_async()
        .await;

    client_for(&server).set_muted(true).await.expect("set_muted should succeed");
    post.assert_async().await;
}

/// Muting re-posts the current level so the stored volume survives
#[tokio::test]
async fn muting_posts_the_current_level_with_the_flag() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/volume")
        .with_status(200)
        .with_body(VOLUME_BODY)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/volume")
        .match_body(r#"<volume muteenabled="true">42</volume>"#)
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    client_for(&server).set_muted(true).await.expect("set_muted should succeed");
    post.assert_async().await;
}

/// The bass range is fetched once and reused for later validations
#[tokio::test]
async fn bass_capabilities_are_cached_after_the_first_fetch() {
    let mut server = Server::new_async().await;
    let caps_mock = server
        .mock("GET", "/bassCapabilities")
        .with_status(200)
        .with_body(BASS_CAPS_BODY)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let first = client.bass_capabilities().await.expect("first fetch should succeed");
    let second = client.bass_capabilities().await.expect("cached fetch should succeed");

    assert_eq!(first, second);
    assert_eq!(first.min, -9);
    assert_eq!(first.max, 0);
    caps_mock.assert_async().await;
}

/// Bass sets are validated against the device-reported range
#[tokio::test]
async fn bass_outside_the_reported_range_is_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/bassCapabilities")
        .with_status(200)
        .with_body(BASS_CAPS_BODY)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/bass")
        .match_body("<bass>-5</bass>")
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.set_bass(-20).await.unwrap_err();
    assert!(matches!(err, SoundTouchError::InvalidArgument(_)));

    client.set_bass(-5).await.expect("in-range bass should post");
    post.assert_async().await;
}

/// Speakers that report no bass support reject sets before any post
#[tokio::test]
async fn unsupported_bass_is_rejected_without_a_post() {
    let mut server = Server::new_async().await;
    let caps = BASS_CAPS_BODY.replace(
        "<bassAvailable>true</bassAvailable>",
        "<bassAvailable>false</bassAvailable>",
    );
    server
        .mock("GET", "/bassCapabilities")
        .with_status(200)
        .with_body(caps)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/bass")
        .with_status(200)
        .with_body(OK_BODY)
        .expect(0)
        .create_async()
        .await;

    let err = client_for(&server).set_bass(0).await.unwrap_err();
    assert!(matches!(err, SoundTouchError::InvalidArgument(_)));
    post.assert_async().await;
}

/// Live-source switches keep the empty account attribute the firmware wants
#[tokio::test]
async fn source_switch_posts_an_empty_account() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/select")
        .match_body(r#"<ContentItem source="BLUETOOTH" sourceAccount=""></ContentItem>"#)
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    client_for(&server)
        .select_source("BLUETOOTH", "")
        .await
        .expect("select_source should succeed");
    mock.assert_async().await;
}

/// URL playback selects a presetable internet-radio item with a display name
#[tokio::test]
async fn play_url_posts_a_presetable_stream_item() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/select")
        .match_body(concat!(
            r#"<ContentItem source="LOCAL_INTERNET_RADIO""#,
            r#" location="http://stream.example.com/jazz.aac" isPresetable="true">"#,
            "<itemName>Jazz 24/7</itemName></ContentItem>",
        ))
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    client_for(&server)
        .play_url("http://stream.example.com/jazz.aac", "Jazz 24/7")
        .await
        .expect("play_url should succeed");
    mock.assert_async().await;
}

/// Levels past the dial are rejected locally, before any request
#[rstest]
#[case(101)]
#[case(255)]
#[tokio::test]
async fn out_of_range_volumes_never_reach_the_device(#[case] level: u8) {
    let client = SoundTouchClient::new("192.0.2.9".parse().unwrap());
    let err = client.set_volume(level).await.unwrap_err();
    assert!(matches!(err, SoundTouchError::InvalidArgument(_)));
}

/// Non-2xx answers surface the status code and the body the device sent
#[tokio::test]
async fn rejections_carry_the_status_and_body() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/volume")
        .with_status(500)
        .with_body("device busy")
        .create_async()
        .await;

    let err = client_for(&server).volume().await.unwrap_err();
    match err {
        SoundTouchError::DeviceRejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "device busy");
        }
        other => panic!("expected DeviceRejected, got {other:?}"),
    }
}

/// Capability probes turn per-control rejections into false flags
#[tokio::test]
async fn capability_probes_map_rejections_to_false() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/bassCapabilities")
        .with_status(200)
        .with_body(BASS_CAPS_BODY)
        .create_async()
        .await;
    server
        .mock("GET", "/audioproducttonecontrols")
        .with_status(404)
        .with_body("not supported")
        .create_async()
        .await;
    server
        .mock("GET", "/audioproductlevelcontrols")
        .with_status(404)
        .with_body("not supported")
        .create_async()
        .await;

    let flags = client_for(&server)
        .capability_flags()
        .await
        .expect("probing should succeed");
    assert!(flags.bass_adjustable);
    assert!(!flags.tone_controls_adjustable);
    assert!(!flags.level_controls_adjustable);
}

/// Renames post the escaped name body
#[tokio::test]
async fn renaming_posts_the_name_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/name")
        .match_body("<name>Living Room &amp; Den</name>")
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    client_for(&server)
        .set_name("Living Room & Den")
        .await
        .expect("set_name should succeed");
    mock.assert_async().await;
}

/// Provisioning clamps the timeout, then leaves setup mode and power-cycles
#[tokio::test]
async fn provisioning_runs_the_full_sequence() {
    let mut server = Server::new_async().await;
    let profile = server
        .mock("POST", "/addWirelessProfile")
        .match_body(concat!(
            r#"<AddWirelessProfile timeout="30">"#,
            r#"<profile ssid="HomeNet" password="hunter2" securityType="wpa_or_wpa2"/>"#,
            "</AddWirelessProfile>",
        ))
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;
    let leave = server
        .mock("POST", "/setup")
        .match_body(r#"<setupState state="SETUP_LEAVE"/>"#)
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;
    let power = server
        .mock("POST", "/key")
        .with_status(200)
        .with_body(OK_BODY)
        .expect(2)
        .create_async()
        .await;

    client_for(&server)
        .add_wireless_profile("HomeNet", "hunter2", bose_soundtouch::WifiSecurity::WpaOrWpa2, Some(300))
        .await
        .expect("provisioning should succeed");
    profile.assert_async().await;
    leave.assert_async().await;
    power.assert_async().await;
}
