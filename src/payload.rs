//! Tag payload codec
//!
//! A tag carries one NDEF text record. The first three bytes are the record
//! header (status byte plus a two-letter language code) and are skipped; the
//! rest is UTF-8 JSON with compact keys:
//!
//! ```text
//! setup: {"t":"g","c":[lon,lat],"r":km,"p":[{"i":id,"l":[lon,lat],"e":{"n":name,"l":[lon,lat]}}]}
//! route: {"t":"r","id":tag_id}
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;
use crate::geo::GeoPoint;

/// Bytes of NDEF text-record header preceding the JSON body.
pub const HEADER_LEN: usize = 3;

/// Header written by [`encode`]: UTF-8, language code "en".
const TEXT_RECORD_HEADER: [u8; HEADER_LEN] = [0x02, b'e', b'n'];

/// A decoded tag command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t")]
pub enum TagCommand {
    #[serde(rename = "g")]
    Setup(SetupCommand),
    #[serde(rename = "r")]
    Route(RouteRequest),
}

impl TagCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::Route(_) => "route",
        }
    }
}

/// Region plus a batch of destination points to cache routes for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupCommand {
    #[serde(rename = "c")]
    pub center: GeoPoint,
    #[serde(rename = "r")]
    pub radius_km: f64,
    #[serde(rename = "p")]
    pub points: Vec<PointSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSpec {
    #[serde(rename = "i")]
    pub id: String,
    #[serde(rename = "l")]
    pub location: GeoPoint,
    #[serde(rename = "e")]
    pub exit: ExitSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSpec {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "l")]
    pub location: GeoPoint,
}

/// Reference to a route cached by an earlier setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    #[serde(rename = "id")]
    pub tag_id: String,
}

impl RouteRequest {
    pub fn new(tag_id: impl Into<String>) -> Self {
        Self {
            tag_id: tag_id.into(),
        }
    }
}

/// Decode raw tag bytes into a command.
pub fn decode(raw: &[u8]) -> Result<TagCommand, DecodeError> {
    if raw.len() <= HEADER_LEN {
        return Err(DecodeError::TooShort {
            len: raw.len(),
            header: HEADER_LEN,
        });
    }

    let text =
        std::str::from_utf8(&raw[HEADER_LEN..]).map_err(|e| DecodeError::Utf8(e.to_string()))?;
    let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;

    let obj = value.as_object().ok_or_else(|| DecodeError::InvalidValue {
        field: "payload",
        reason: "expected a JSON object".into(),
    })?;

    let kind = match obj.get("t") {
        None => return Err(DecodeError::MissingField("t")),
        Some(Value::String(s)) => s.as_str(),
        Some(other) => return Err(DecodeError::UnknownKind(other.to_string())),
    };

    match kind {
        "g" => {
            for field in ["c", "r", "p"] {
                if !obj.contains_key(field) {
                    return Err(DecodeError::MissingField(field));
                }
            }
            let cmd: SetupCommand =
                serde_json::from_value(value.clone()).map_err(|e| DecodeError::InvalidValue {
                    field: "setup",
                    reason: e.to_string(),
                })?;
            validate_setup(&cmd)?;
            Ok(TagCommand::Setup(cmd))
        }
        "r" => {
            let id = match obj.get("id") {
                None => return Err(DecodeError::MissingField("id")),
                Some(Value::String(s)) => s.as_str(),
                Some(other) => {
                    return Err(DecodeError::InvalidValue {
                        field: "id",
                        reason: format!("expected a string, got {}", other),
                    })
                }
            };
            if id.is_empty() {
                return Err(DecodeError::InvalidValue {
                    field: "id",
                    reason: "empty tag id".into(),
                });
            }
            Ok(TagCommand::Route(RouteRequest::new(id)))
        }
        other => Err(DecodeError::UnknownKind(other.to_string())),
    }
}

/// Encode a command as tag bytes, header included.
pub fn encode(cmd: &TagCommand) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(cmd)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&TEXT_RECORD_HEADER);
    out.extend_from_slice(&body);
    Ok(out)
}

fn validate_setup(cmd: &SetupCommand) -> Result<(), DecodeError> {
    if !cmd.radius_km.is_finite() || cmd.radius_km <= 0.0 {
        return Err(DecodeError::InvalidValue {
            field: "r",
            reason: format!("radius must be a positive number of km, got {}", cmd.radius_km),
        });
    }
    validate_point("c", cmd.center)?;

    let mut seen = HashSet::new();
    for point in &cmd.points {
        if point.id.is_empty() {
            return Err(DecodeError::InvalidValue {
                field: "i",
                reason: "empty point id".into(),
            });
        }
        if !seen.insert(point.id.as_str()) {
            return Err(DecodeError::InvalidValue {
                field: "i",
                reason: format!("duplicate point id {:?}", point.id),
            });
        }
        validate_point("l", point.location)?;
        validate_point("e.l", point.exit.location)?;
    }
    Ok(())
}

fn validate_point(field: &'static str, p: GeoPoint) -> Result<(), DecodeError> {
    if !p.is_finite() || !(-180.0..=180.0).contains(&p.lon) || !(-90.0..=90.0).contains(&p.lat) {
        return Err(DecodeError::InvalidValue {
            field,
            reason: format!("coordinate out of range: [{}, {}]", p.lon, p.lat),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_header(json: &str) -> Vec<u8> {
        let mut bytes = vec![0x02, b'e', b'n'];
        bytes.extend_from_slice(json.as_bytes());
        bytes
    }

    #[test]
    fn test_decode_route_request() {
        let cmd = decode(&with_header(r#"{"t":"r","id":"exit_north"}"#)).unwrap();
        assert_eq!(cmd, TagCommand::Route(RouteRequest::new("exit_north")));
    }

    #[test]
    fn test_decode_setup() {
        let json = r#"{"t":"g","c":[-0.1276,51.5074],"r":1,"p":[
            {"i":"gate_a","l":[-0.128,51.507],"e":{"n":"North Exit","l":[-0.127,51.509]}},
            {"i":"gate_b","l":[-0.126,51.506],"e":{"n":"South Exit","l":[-0.126,51.504]}}
        ]}"#;
        let TagCommand::Setup(cmd) = decode(&with_header(json)).unwrap() else {
            panic!("expected setup");
        };
        assert_eq!(cmd.center, GeoPoint::new(-0.1276, 51.5074));
        assert_eq!(cmd.radius_km, 1.0);
        assert_eq!(cmd.points.len(), 2);
        assert_eq!(cmd.points[0].id, "gate_a");
        assert_eq!(cmd.points[1].exit.name, "South Exit");
        assert_eq!(cmd.points[1].exit.location, GeoPoint::new(-0.126, 51.504));
    }

    #[test]
    fn test_header_bytes_are_ignored() {
        let mut bytes = with_header(r#"{"t":"r","id":"x"}"#);
        bytes[0] = 0xff;
        bytes[1] = 0x00;
        bytes[2] = 0x7f;
        assert!(decode(&bytes).is_ok());
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        assert!(matches!(
            decode(&[0x02, b'e', b'n']),
            Err(DecodeError::TooShort { len: 3, .. })
        ));
        assert!(matches!(decode(&[]), Err(DecodeError::TooShort { .. })));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert_eq!(
            decode(&with_header(r#"{"t":"x","id":"a"}"#)),
            Err(DecodeError::UnknownKind("x".into()))
        );
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        assert!(matches!(
            decode(&with_header(r#"{"t":"r","id":"#)),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode(&with_header("[1,2]")),
            Err(DecodeError::InvalidValue { field: "payload", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let bytes = [0x02, b'e', b'n', 0xc3, 0x28];
        assert!(matches!(decode(&bytes), Err(DecodeError::Utf8(_))));
    }

    #[test]
    fn test_decode_missing_fields() {
        assert_eq!(
            decode(&with_header(r#"{"id":"a"}"#)),
            Err(DecodeError::MissingField("t"))
        );
        assert_eq!(
            decode(&with_header(r#"{"t":"r"}"#)),
            Err(DecodeError::MissingField("id"))
        );
        assert_eq!(
            decode(&with_header(r#"{"t":"g","c":[0,0],"p":[]}"#)),
            Err(DecodeError::MissingField("r"))
        );
    }

    #[test]
    fn test_decode_is_all_or_nothing() {
        // second point is missing its exit
        let json = r#"{"t":"g","c":[0,0],"r":1,"p":[
            {"i":"a","l":[0,0],"e":{"n":"A","l":[0,0.001]}},
            {"i":"b","l":[0,0]}
        ]}"#;
        assert!(matches!(
            decode(&with_header(json)),
            Err(DecodeError::InvalidValue { field: "setup", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_values() {
        let bad_radius = r#"{"t":"g","c":[0,0],"r":-1,"p":[]}"#;
        assert!(matches!(
            decode(&with_header(bad_radius)),
            Err(DecodeError::InvalidValue { field: "r", .. })
        ));

        let bad_lat = r#"{"t":"g","c":[0,95],"r":1,"p":[]}"#;
        assert!(matches!(
            decode(&with_header(bad_lat)),
            Err(DecodeError::InvalidValue { field: "c", .. })
        ));

        let duplicate = r#"{"t":"g","c":[0,0],"r":1,"p":[
            {"i":"a","l":[0,0],"e":{"n":"A","l":[0,0.001]}},
            {"i":"a","l":[0,0],"e":{"n":"B","l":[0,0.002]}}
        ]}"#;
        assert!(matches!(
            decode(&with_header(duplicate)),
            Err(DecodeError::InvalidValue { field: "i", .. })
        ));

        assert!(matches!(
            decode(&with_header(r#"{"t":"r","id":""}"#)),
            Err(DecodeError::InvalidValue { field: "id", .. })
        ));
    }

    #[test]
    fn test_encode_writes_text_record_header() {
        let bytes = encode(&TagCommand::Route(RouteRequest::new("exit_north"))).unwrap();
        assert_eq!(&bytes[..HEADER_LEN], &[0x02, b'e', b'n']);
        assert_eq!(
            std::str::from_utf8(&bytes[HEADER_LEN..]).unwrap(),
            r#"{"t":"r","id":"exit_north"}"#
        );
    }

    #[test]
    fn test_encoded_setup_decodes_back() {
        let cmd = TagCommand::Setup(SetupCommand {
            center: GeoPoint::new(2.3522, 48.8566),
            radius_km: 2.5,
            points: vec![PointSpec {
                id: "louvre".into(),
                location: GeoPoint::new(2.3376, 48.8606),
                exit: ExitSpec {
                    name: "Pyramide".into(),
                    location: GeoPoint::new(2.3359, 48.8611),
                },
            }],
        });
        assert_eq!(decode(&encode(&cmd).unwrap()).unwrap(), cmd);
    }

    #[test]
    fn test_ids_are_kept_verbatim() {
        let json = r#"{"t":"g","c":[0,0],"r":1,"p":[
            {"i":" gate ","l":[0,0],"e":{"n":"Exit","l":[0.001,0]}}
        ]}"#;
        let TagCommand::Setup(cmd) = decode(&with_header(json)).unwrap() else {
            panic!("expected setup");
        };
        assert_eq!(cmd.points[0].id, " gate ");

        let route = decode(&with_header(r#"{"t":"r","id":" gate "}"#)).unwrap();
        assert_eq!(route, TagCommand::Route(RouteRequest::new(" gate ")));

        let setup = TagCommand::Setup(cmd);
        assert_eq!(decode(&encode(&setup).unwrap()).unwrap(), setup);
    }
}
