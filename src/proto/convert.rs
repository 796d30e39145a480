//! Conversions between the wire message and the domain event model.
//!
//! `meta` crosses the boundary as a protobuf `Struct`, so only
//! JSON-representable values survive the trip; a value that cannot be
//! represented on the other side is a [`TransportError::ConversionFailed`]
//! rather than a silent rewrite. Payload bytes are copied at the boundary
//! so neither side can alias the other's buffer.

use prost_types::value::Kind;
use prost_types::{ListValue, Struct, Value};

use crate::error::TransportError;
use crate::messaging::{EventMessage, Meta};
use crate::proto::GrpcEventMessage;

/// Converts a domain event to its wire form.
pub fn to_wire(msg: &EventMessage) -> Result<GrpcEventMessage, TransportError> {
    Ok(GrpcEventMessage {
        function: msg.function.clone(),
        node: msg.node.clone(),
        workflow: msg.workflow.clone(),
        version: msg.version.clone(),
        server: msg.server.clone(),
        event: msg.event.clone(),
        text: msg.text.clone(),
        run: msg.run.clone(),
        meta: msg.meta.as_ref().map(meta_to_struct).transpose()?,
        payload: msg.payload.clone().unwrap_or_default(),
        correlation_id: msg.correlation_id.clone(),
    })
}

/// Converts a wire message to the domain event model.
pub fn from_wire(msg: GrpcEventMessage) -> Result<EventMessage, TransportError> {
    Ok(EventMessage {
        function: msg.function,
        node: msg.node,
        workflow: msg.workflow,
        version: msg.version,
        server: msg.server,
        event: msg.event,
        text: msg.text,
        run: msg.run,
        meta: msg.meta.map(struct_to_meta).transpose()?,
        payload: if msg.payload.is_empty() {
            None
        } else {
            Some(msg.payload)
        },
        correlation_id: msg.correlation_id,
    })
}

fn meta_to_struct(meta: &Meta) -> Result<Struct, TransportError> {
    let fields = meta
        .iter()
        .map(|(k, v)| Ok((k.clone(), json_to_proto(v)?)))
        .collect::<Result<_, TransportError>>()?;
    Ok(Struct { fields })
}

fn struct_to_meta(s: Struct) -> Result<Meta, TransportError> {
    s.fields
        .into_iter()
        .map(|(k, v)| Ok((k, proto_to_json(v)?)))
        .collect()
}

fn json_to_proto(value: &serde_json::Value) -> Result<Value, TransportError> {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().ok_or_else(|| {
            TransportError::ConversionFailed(format!(
                "meta number {n} is not representable on the wire"
            ))
        })?),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items
                .iter()
                .map(json_to_proto)
                .collect::<Result<_, _>>()?,
        }),
        serde_json::Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .iter()
                .map(|(k, v)| Ok((k.clone(), json_to_proto(v)?)))
                .collect::<Result<_, TransportError>>()?,
        }),
    };
    Ok(Value { kind: Some(kind) })
}

fn proto_to_json(value: Value) -> Result<serde_json::Value, TransportError> {
    Ok(match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| {
                TransportError::ConversionFailed(format!("meta number {n} is not valid JSON"))
            })?,
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values
                .into_iter()
                .map(proto_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| Ok((k, proto_to_json(v)?)))
                .collect::<Result<_, TransportError>>()?,
        ),
    })
}
