//! Wire model for the nested-call protocol.
//!
//! An [`Envelope`] carries caller metadata and an ordered list of
//! [`Action`]s. Each action is a tagged [`Operation`] plus the annotations a
//! serving instance writes back (`status`, `serviceName`, `returnTime`).
//!
//! Payload shapes are checked while deserializing: a known tag with a
//! malformed payload fails the whole envelope, an unknown tag is kept as
//! [`Operation::Unknown`] so it can be reported back to the caller.
//! Annotations are opaque JSON until this service stamps its own, so peers
//! with other status spellings or epoch timestamps pass through unchanged.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::config::Limits;
use crate::error::{NestError, Result};

/// Meta key stamped with the completion time of the envelope.
pub const RETURN_TIME: &str = "returnTime";

/// Render a timestamp the way every stamp on the wire is written.
///
/// Fixed microsecond precision keeps lexical and chronological order equal.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn null_as_empty<'de, D>(d: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(d)?.unwrap_or_default())
}

impl Envelope {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            meta: Map::new(),
            actions,
        }
    }

    /// Deepest chain of nested `Call`s. An envelope without calls has depth 0.
    pub fn call_depth(&self) -> usize {
        call_depth(&self.actions)
    }

    /// Number of actions across every nesting level.
    pub fn total_actions(&self) -> usize {
        total_actions(&self.actions)
    }

    /// Reject envelopes whose nesting or size exceeds `limits`.
    pub fn check_limits(&self, limits: &Limits) -> Result<()> {
        let depth = self.call_depth();
        if depth > limits.max_depth {
            return Err(NestError::TooDeep {
                depth,
                max: limits.max_depth,
            });
        }
        let count = self.total_actions();
        if count > limits.max_actions {
            return Err(NestError::TooManyActions {
                count,
                max: limits.max_actions,
            });
        }
        Ok(())
    }
}

fn call_depth(actions: &[Action]) -> usize {
    actions
        .iter()
        .filter_map(|a| match &a.operation {
            Operation::Call(call) => Some(1 + call_depth(&call.actions)),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

fn total_actions(actions: &[Action]) -> usize {
    actions
        .iter()
        .map(|a| match &a.operation {
            Operation::Call(call) => 1 + total_actions(&call.actions),
            _ => 1,
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Passed,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Passed => "Passed",
            Status::Failed => "Failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPayload {
    /// Storage backend name.
    pub service_name: String,
    pub key: String,
    /// Filled in once the read has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritePayload {
    /// Storage backend name.
    pub service_name: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPayload {
    /// Peer service name.
    pub service_name: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Acknowledge only. The payload, if any, is never inspected.
    Echo(Value),
    Read(ReadPayload),
    Write(WritePayload),
    Call(CallPayload),
    /// A tag outside the protocol, carried through verbatim.
    Unknown { tag: String, payload: Value },
}

impl Operation {
    pub fn tag(&self) -> &str {
        match self {
            Operation::Echo(_) => "Echo",
            Operation::Read(_) => "Read",
            Operation::Write(_) => "Write",
            Operation::Call(_) => "Call",
            Operation::Unknown { tag, .. } => tag,
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct Action {
    pub operation: Operation,
    pub status: Option<Value>,
    pub service_name: Option<Value>,
    pub return_time: Option<Value>,
}

impl Action {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            status: None,
            service_name: None,
            return_time: None,
        }
    }

    pub fn echo() -> Self {
        Self::new(Operation::Echo(Value::Null))
    }

    pub fn read(backend: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(Operation::Read(ReadPayload {
            service_name: backend.into(),
            key: key.into(),
            value: None,
        }))
    }

    pub fn write(
        backend: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(Operation::Write(WritePayload {
            service_name: backend.into(),
            key: key.into(),
            value: value.into(),
        }))
    }

    pub fn call(service: impl Into<String>, actions: Vec<Action>) -> Self {
        Self::new(Operation::Call(CallPayload {
            service_name: service.into(),
            actions,
        }))
    }

    /// Overwrite every annotation with this service's provenance.
    pub fn stamp(&mut self, status: Status, service: &str, at: DateTime<Utc>) {
        self.status = Some(Value::String(status.as_str().to_string()));
        self.service_name = Some(Value::String(service.to_string()));
        self.return_time = Some(Value::String(format_timestamp(at)));
    }

    /// `status`, when it is one of the two spellings this protocol uses.
    pub fn status(&self) -> Option<Status> {
        match self.status.as_ref()?.as_str()? {
            "Passed" => Some(Status::Passed),
            "Failed" => Some(Status::Failed),
            _ => None,
        }
    }

    /// `serviceName`, when it is a string.
    pub fn service(&self) -> Option<&str> {
        self.service_name.as_ref()?.as_str()
    }

    /// Parsed `returnTime`.
    ///
    /// Strings are read as RFC 3339. Integers are Unix seconds, or
    /// milliseconds when too large to be a plausible seconds value.
    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        match self.return_time.as_ref()? {
            Value::String(raw) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Number(n) => {
                let n = n.as_i64()?;
                if n.abs() >= EPOCH_MILLIS_THRESHOLD {
                    DateTime::from_timestamp_millis(n)
                } else {
                    DateTime::from_timestamp(n, 0)
                }
            }
            _ => None,
        }
    }
}

/// Seconds past this would be year 5138; treat such numbers as millis.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Loose wire form; payloads are checked in `TryFrom`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    action: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    service_name: Option<Value>,
    #[serde(default)]
    return_time: Option<Value>,
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> std::result::Result<Self, Self::Error> {
        fn payload<T: serde::de::DeserializeOwned>(
            tag: &str,
            value: Value,
        ) -> std::result::Result<T, String> {
            serde_json::from_value(value).map_err(|e| format!("invalid {tag} payload: {e}"))
        }

        let operation = match raw.action.as_str() {
            "Echo" => Operation::Echo(raw.payload),
            "Read" => Operation::Read(payload("Read", raw.payload)?),
            "Write" => Operation::Write(payload("Write", raw.payload)?),
            "Call" => Operation::Call(payload("Call", raw.payload)?),
            _ => Operation::Unknown {
                tag: raw.action,
                payload: raw.payload,
            },
        };
        Ok(Self {
            operation,
            status: raw.status,
            service_name: raw.service_name,
            return_time: raw.return_time,
        })
    }
}

impl Serialize for Action {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("action", self.operation.tag())?;
        match &self.operation {
            Operation::Echo(p) | Operation::Unknown { payload: p, .. } => {
                if !p.is_null() {
                    map.serialize_entry("payload", p)?;
                }
            }
            Operation::Read(p) => map.serialize_entry("payload", p)?,
            Operation::Write(p) => map.serialize_entry("payload", p)?,
            Operation::Call(p) => map.serialize_entry("payload", p)?,
        }
        if let Some(status) = &self.status {
            map.serialize_entry("status", status)?;
        }
        if let Some(name) = &self.service_name {
            map.serialize_entry("serviceName", name)?;
        }
        if let Some(ts) = &self.return_time {
            map.serialize_entry("returnTime", ts)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Envelope {
        serde_json::from_value(value).expect("failed to parse envelope")
    }

    #[test]
    fn parse_mixed_actions_in_order() {
        let env = parse(json!({
            "meta": {"traceId": "t-1"},
            "actions": [
                {"action": "Echo"},
                {"action": "Write", "payload": {"serviceName": "mysql", "key": "u1", "value": "hello"}},
                {"action": "Read", "payload": {"serviceName": "mysql", "key": "u1"}},
                {"action": "Call", "payload": {"serviceName": "ruby", "actions": [{"action": "Echo"}]}}
            ]
        }));
        assert_eq!(env.meta["traceId"], "t-1");
        let tags: Vec<&str> = env.actions.iter().map(|a| a.operation.tag()).collect();
        assert_eq!(tags, ["Echo", "Write", "Read", "Call"]);
        let Operation::Call(call) = &env.actions[3].operation else {
            panic!("expected Call")
        };
        assert_eq!(call.service_name, "ruby");
        assert_eq!(call.actions.len(), 1);
    }

    #[test]
    fn null_and_missing_meta_are_empty() {
        assert!(parse(json!({"meta": null, "actions": []})).meta.is_empty());
        assert!(parse(json!({"actions": []})).meta.is_empty());
    }

    #[test]
    fn read_without_key_is_rejected() {
        let err = serde_json::from_value::<Envelope>(json!({
            "actions": [{"action": "Read", "payload": {"serviceName": "mysql"}}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("invalid Read payload"), "{err}");
    }

    #[test]
    fn unknown_tag_survives_round_trip() {
        let input = json!({"action": "Sleep", "payload": {"ms": 5}});
        let action: Action = serde_json::from_value(input.clone()).unwrap();
        assert!(matches!(&action.operation, Operation::Unknown { tag, .. } if tag == "Sleep"));
        assert_eq!(serde_json::to_value(&action).unwrap(), input);
    }

    #[test]
    fn echo_payload_is_preserved_verbatim() {
        let input = json!({"action": "Echo", "payload": {"anything": [1, 2, {"x": null}]}});
        let action: Action = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&action).unwrap(), input);
    }

    #[test]
    fn annotations_serialize_in_camel_case() {
        let mut action = Action::read("mysql", "k");
        let at = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
        action.stamp(Status::Passed, "nestcall", at);
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["status"], "Passed");
        assert_eq!(v["serviceName"], "nestcall");
        assert_eq!(v["returnTime"], "2024-01-01T00:00:00.000000Z");
        assert!(v["payload"].get("value").is_none());
        assert_eq!(action.status(), Some(Status::Passed));
        assert_eq!(action.service(), Some("nestcall"));
        assert_eq!(action.returned_at(), Some(at));
    }

    #[test]
    fn foreign_annotations_are_accepted_verbatim() {
        let input = json!({
            "action": "Echo",
            "status": "Pending",
            "serviceName": 42,
            "returnTime": 1_700_000_000_123_i64
        });
        let env = parse(json!({"actions": [input.clone()]}));
        let action = &env.actions[0];
        assert_eq!(action.status(), None);
        assert_eq!(action.service(), None);
        assert_eq!(
            action.returned_at(),
            DateTime::from_timestamp_millis(1_700_000_000_123)
        );
        assert_eq!(serde_json::to_value(action).unwrap(), input);
    }

    #[test]
    fn epoch_seconds_return_time_is_understood() {
        let action: Action =
            serde_json::from_value(json!({"action": "Echo", "returnTime": 1_700_000_000})).unwrap();
        assert_eq!(action.returned_at(), DateTime::from_timestamp(1_700_000_000, 0));

        let action: Action =
            serde_json::from_value(json!({"action": "Echo", "returnTime": [1, 2]})).unwrap();
        assert_eq!(action.returned_at(), None);
    }

    #[test]
    fn depth_and_size_count_nested_calls() {
        let env = Envelope::new(vec![
            Action::echo(),
            Action::call(
                "a",
                vec![Action::call("b", vec![Action::echo(), Action::echo()])],
            ),
        ]);
        assert_eq!(env.call_depth(), 2);
        assert_eq!(env.total_actions(), 5);
        assert_eq!(Envelope::new(vec![Action::echo()]).call_depth(), 0);
    }

    #[test]
    fn check_limits_rejects_deep_and_large_envelopes() {
        let env = Envelope::new(vec![Action::call(
            "a",
            vec![Action::call("b", vec![Action::echo()])],
        )]);
        let tight = Limits {
            max_depth: 1,
            max_actions: 100,
        };
        assert!(matches!(
            env.check_limits(&tight),
            Err(NestError::TooDeep { depth: 2, max: 1 })
        ));
        let small = Limits {
            max_depth: 8,
            max_actions: 2,
        };
        assert!(matches!(
            env.check_limits(&small),
            Err(NestError::TooManyActions { count: 3, max: 2 })
        ));
        assert!(env.check_limits(&Limits::default()).is_ok());
    }

    #[test]
    fn timestamps_have_fixed_width() {
        let ts = DateTime::parse_from_rfc3339("2024-05-06T07:08:09Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(ts), "2024-05-06T07:08:09.000000Z");
    }
}
