//! Métadonnées DIDL-Lite envoyées avec `SetAVTransportURI`.

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::errors::ControlPointError;
use crate::model::Track;

const DIDL_NS: &str = "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const UPNP_NS: &str = "urn:schemas-upnp-org:metadata-1-0/upnp/";
const MUSIC_TRACK_CLASS: &str = "object.item.audioItem.musicTrack";

fn text_child(name: &str, text: &str) -> XMLNode {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    XMLNode::Element(elem)
}

/// Construit le document DIDL-Lite d'une piste servie à `uri`.
pub fn build_track_metadata(track: &Track, uri: &str, protocol_info: &str) -> Result<String, ControlPointError> {
    let mut item = Element::new("item");
    item.attributes.insert("id".to_string(), track.id.clone());
    item.attributes.insert("parentID".to_string(), "-1".to_string());
    item.attributes.insert("restricted".to_string(), "1".to_string());

    item.children.push(text_child("dc:title", &track.title));
    if !track.artist.is_empty() {
        item.children.push(text_child("dc:creator", &track.artist));
        item.children.push(text_child("upnp:artist", &track.artist));
    }
    if !track.album.is_empty() {
        item.children.push(text_child("upnp:album", &track.album));
    }
    item.children.push(text_child("upnp:class", MUSIC_TRACK_CLASS));
    if let Some(cover) = track.cover_url.as_deref().filter(|c| !c.is_empty()) {
        item.children.push(text_child("upnp:albumArtURI", cover));
    }

    let mut res = Element::new("res");
    res.attributes
        .insert("protocolInfo".to_string(), protocol_info.to_string());
    if let Some(duration_ms) = track.duration_ms {
        res.attributes.insert(
            "duration".to_string(),
            format!("{}.000", crate::time_utils::format_hhmmss(duration_ms / 1000)),
        );
    }
    res.children.push(XMLNode::Text(uri.to_string()));
    item.children.push(XMLNode::Element(res));

    let mut didl = Element::new("DIDL-Lite");
    didl.attributes.insert("xmlns".to_string(), DIDL_NS.to_string());
    didl.attributes.insert("xmlns:dc".to_string(), DC_NS.to_string());
    didl.attributes.insert("xmlns:upnp".to_string(), UPNP_NS.to_string());
    didl.children.push(XMLNode::Element(item));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(false)
        .perform_indent(false);
    didl.write_with_config(&mut buf, config)
        .map_err(|e| ControlPointError::SoapBuild("DIDL-Lite".to_string(), e.to_string()))?;
    String::from_utf8(buf).map_err(|e| ControlPointError::SoapBuild("DIDL-Lite".to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QualityTier, TrackSource};

    fn track() -> Track {
        Track {
            id: "12345".to_string(),
            title: "Tom & Jerry <live>".to_string(),
            artist: "Miles Davis".to_string(),
            album: "Kind of Blue".to_string(),
            duration_ms: Some(545_000),
            cover_url: Some("http://img/cover.jpg".to_string()),
            source: TrackSource::new("https://cdn/track.flac"),
            quality: QualityTier::Cd,
        }
    }

    #[test]
    fn metadata_contains_track_fields() {
        let xml = build_track_metadata(
            &track(),
            "http://10.0.0.2:7120/stream/abc",
            "http-get:*:audio/flac:DLNA.ORG_OP=01",
        )
        .unwrap();

        assert!(xml.starts_with("<DIDL-Lite"));
        assert!(xml.contains("Tom &amp; Jerry &lt;live"));
        assert!(xml.contains("<dc:creator>Miles Davis</dc:creator>"));
        assert!(xml.contains("<upnp:artist>Miles Davis</upnp:artist>"));
        assert!(xml.contains("<upnp:album>Kind of Blue</upnp:album>"));
        assert!(xml.contains("<upnp:class>object.item.audioItem.musicTrack</upnp:class>"));
        assert!(xml.contains("<upnp:albumArtURI>http://img/cover.jpg</upnp:albumArtURI>"));
        assert!(xml.contains(r#"protocolInfo="http-get:*:audio/flac:DLNA.ORG_OP=01""#));
        assert!(xml.contains(r#"duration="00:09:05.000""#));
        assert!(xml.contains(">http://10.0.0.2:7120/stream/abc</res>"));
    }

    #[test]
    fn metadata_skips_missing_optional_fields() {
        let mut t = track();
        t.cover_url = None;
        t.album.clear();
        t.duration_ms = None;
        let xml = build_track_metadata(&t, "http://h/s", "http-get:*:audio/mpeg:*").unwrap();
        assert!(!xml.contains("albumArtURI"));
        assert!(!xml.contains("upnp:album>"));
        assert!(!xml.contains("duration="));
    }
}
